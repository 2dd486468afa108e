//! Actor-critic agent implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The agent learns a categorical policy over a finite action set. Its critic
//! is either a multilayer perceptron or a simulated variational quantum
//! circuit, selected by [`QNetConfig`]. Both variants train through the same
//! loop in [`ActorCritic`].
pub mod ac;
mod actor;
mod critic;
mod ent_coef;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod quantum;
pub mod util;
pub use ac::{ActorCritic, ActorCriticConfig};
pub use actor::{Actor, ActorConfig};
pub use critic::{Critic, CriticConfig, QNet, QNetConfig};
pub use ent_coef::{EntCoef, EntCoefMode};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The GPU device of the given ordinal.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
