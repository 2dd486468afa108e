//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Functions in the workspace return [`anyhow::Result`]; callers that need to
/// distinguish recoverable failures use `err.downcast_ref::<AlphamatError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlphamatError {
    /// An action outside the legal action set was given to the environment.
    #[error("Invalid action {index}: {reason}")]
    InvalidAction {
        /// Index of the offending action.
        index: usize,
        /// Why the action was rejected.
        reason: String,
    },

    /// The environment state became non-finite.
    #[error("Numeric divergence: {0}")]
    NumericDivergence(String),

    /// The quantum critic received rotation parameters outside its domain.
    #[error("Circuit evaluation error: {0}")]
    CircuitEvaluation(String),

    /// Sampling was requested before enough transitions were stored.
    #[error("Insufficient data: requested {requested} transitions, {available} stored")]
    InsufficientData {
        /// Requested batch size.
        requested: usize,
        /// Number of stored transitions.
        available: usize,
    },

    /// Invalid configuration, detected before training starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A transition of a different shape was pushed into a replay buffer.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Width the buffer was filled with.
        expected: usize,
        /// Width of the rejected item.
        actual: usize,
    },

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

impl AlphamatError {
    /// Returns `true` for errors the trainer recovers from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NumericDivergence(_) | Self::CircuitEvaluation(_) | Self::InsufficientData { .. }
        )
    }

    /// Short name used as a suffix of recorder keys.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAction { .. } => "invalid_action",
            Self::NumericDivergence(_) => "numeric_divergence",
            Self::CircuitEvaluation(_) => "circuit_evaluation",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Config(_) => "config",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::RecordKeyError(_) => "record_key",
            Self::RecordValueTypeError(_) => "record_value_type",
        }
    }
}

/// Returns the [`AlphamatError`] at the root of an [`anyhow::Error`], if any.
pub fn as_alphamat_error(err: &anyhow::Error) -> Option<&AlphamatError> {
    err.chain().find_map(|e| e.downcast_ref::<AlphamatError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_recoverable_kinds() {
        assert!(AlphamatError::NumericDivergence("x".into()).is_recoverable());
        assert!(AlphamatError::CircuitEvaluation("x".into()).is_recoverable());
        assert!(AlphamatError::InsufficientData {
            requested: 32,
            available: 10
        }
        .is_recoverable());
        assert!(!AlphamatError::Config("n must be positive".into()).is_recoverable());
        assert!(!AlphamatError::InvalidAction {
            index: 3,
            reason: "out of range".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_find_through_context() {
        let res: anyhow::Result<()> = Err(AlphamatError::InsufficientData {
            requested: 32,
            available: 10,
        })
        .context("sampling a minibatch");
        let err = res.unwrap_err();
        let found = as_alphamat_error(&err).unwrap();
        assert_eq!(found.kind(), "insufficient_data");
    }
}
