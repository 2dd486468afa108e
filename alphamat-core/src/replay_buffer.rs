//! A generic implementation of replay buffer.
mod base;
mod batch;
mod config;
mod step_proc;
pub use base::{BatchBase, SimpleReplayBuffer};
pub use batch::GenericTransitionBatch;
pub use config::SimpleReplayBufferConfig;
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
