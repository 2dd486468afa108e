#![warn(missing_docs)]
//! Core components of alphamat: interfaces of environments, agents and replay
//! buffers, records, and the off-policy [`Trainer`].
//!
//! # Observation and action
//!
//! [`Obs`] and [`Act`] are the observation and action of an environment
//! implementing [`Env`]. Environments with a finite action set expose the
//! legality of each action through [`MaskedFeatures`].
//!
//! # Replay buffer
//!
//! [`ExperienceBufferBase`] stores transitions, [`ReplayBufferBase`] samples
//! minibatches of them. [`replay_buffer::SimpleReplayBuffer`] implements both as
//! a fixed-capacity ring, with transitions produced by
//! [`replay_buffer::SimpleStepProcessor`].
//!
//! # Training
//!
//! [`Trainer`] runs episodes of the environment with an [`Agent`], pushes
//! transitions into the replay buffer, performs optimization steps, evaluates
//! the agent with an [`Evaluator`] and saves checkpoints. Metrics go to an
//! [`AggregateRecorder`](record::AggregateRecorder).
pub mod error;
mod evaluator;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, MaskedFeatures, Obs, Policy,
    ReplayBufferBase, Step, StepProcessor, TransitionBatch,
};

mod trainer;
pub use evaluator::{DefaultEvaluator, Evaluator};
pub use trainer::{
    checkpoint_dir, Sampler, StopSignal, Trainer, TrainerConfig, TrainerState, TrainingSummary,
    AGENT_DIR, REPLAY_BUFFER_FILE, TRAINER_STATE_FILE,
};
