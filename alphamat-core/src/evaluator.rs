//! Evaluate a [`Policy`].
use crate::{record::Record, Env, Policy};
use anyhow::Result;
mod default_evaluator;
pub use default_evaluator::DefaultEvaluator;

/// Evaluate a [`Policy`].
pub trait Evaluator<E: Env, P: Policy<E>> {
    /// Evaluate the policy.
    ///
    /// Returns the score used to keep the best model (larger is better) and a
    /// record of evaluation metrics.
    ///
    /// The caller of this method needs to handle the internal state of `policy`,
    /// like training/evaluation mode.
    fn evaluate(&mut self, policy: &mut P) -> Result<(f32, Record)>;
}
