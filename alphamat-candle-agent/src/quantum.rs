//! Critic backed by a simulated variational quantum circuit.
mod base;
mod circuit;
mod config;
pub use base::QuantumCritic;
pub use circuit::Circuit;
pub use config::{Encoding, QuantumCriticConfig};
