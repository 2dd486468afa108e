//! Core functionalities.
mod agent;
mod batch;
mod env;
mod policy;
mod replay_buffer;
mod step;
pub use agent::Agent;
pub use batch::TransitionBatch;
pub use env::Env;
pub use policy::{Configurable, Policy};
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
use std::fmt::Debug;
pub use step::{Info, Step, StepProcessor};

/// An observation of an environment.
///
/// Environments in this crate are not vectorized, so an observation always
/// describes a single state.
pub trait Obs: Clone + Debug {}

/// An action of an environment.
pub trait Act: Clone + Debug {}

/// Rows of flat features together with the legality of a finite set of actions.
///
/// Implemented by observations (one row) and by observation batches (one row
/// per sample). Features are row-major `(n_rows, dim)`, the mask is row-major
/// `(n_rows, n_actions)` with `1.0` for legal and `0.0` for illegal actions.
/// Agents use the mask to keep illegal actions out of the selection.
pub trait MaskedFeatures {
    /// Returns the row-major features.
    fn features(&self) -> &[f32];

    /// Returns the width of a row of features.
    fn dim(&self) -> usize;

    /// Returns the row-major action mask.
    fn action_mask(&self) -> &[f32];

    /// Returns the number of actions in a row of the mask.
    fn n_actions(&self) -> usize;

    /// Returns the number of rows.
    fn n_rows(&self) -> usize {
        match self.dim() {
            0 => 0,
            dim => self.features().len() / dim,
        }
    }
}
