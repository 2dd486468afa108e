use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Activation of the encoding stage, mapping a linear projection of the input to
/// rotation angles.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
pub enum Encoding {
    /// `π * tanh(x)`.
    #[default]
    Tanh,

    /// The projection itself.
    Identity,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`QuantumCritic`](super::QuantumCritic).
pub struct QuantumCriticConfig {
    /// Width of the concatenated state-action input.
    pub in_dim: usize,

    /// Number of qubits, one rotation angle each.
    pub n_qubits: usize,

    /// Number of variational layers.
    pub n_layers: usize,

    /// Activation of the encoding stage.
    pub encoding: Encoding,

    /// Encode the input angles again in every layer.
    pub reupload: bool,

    /// Largest magnitude of an encoded angle.
    pub max_angle: f64,

    /// Clamp out-of-range angles instead of failing.
    pub clip_angles: bool,
}

impl QuantumCriticConfig {
    /// Creates a configuration with `Tanh` encoding and no re-uploading.
    pub fn new(in_dim: usize, n_qubits: usize, n_layers: usize) -> Self {
        Self {
            in_dim,
            n_qubits,
            n_layers,
            encoding: Encoding::Tanh,
            reupload: false,
            max_angle: 2.0 * std::f64::consts::PI,
            clip_angles: false,
        }
    }

    /// Sets the encoding activation.
    pub fn encoding(mut self, v: Encoding) -> Self {
        self.encoding = v;
        self
    }

    /// Sets data re-uploading.
    pub fn reupload(mut self, v: bool) -> Self {
        self.reupload = v;
        self
    }

    /// Sets the largest magnitude of an encoded angle.
    pub fn max_angle(mut self, v: f64) -> Self {
        self.max_angle = v;
        self
    }

    /// Sets angle clipping.
    pub fn clip_angles(mut self, v: bool) -> Self {
        self.clip_angles = v;
        self
    }

    /// Checks the circuit size and the angle bound.
    pub fn validate(&self) -> Result<()> {
        if self.in_dim == 0 || self.n_layers == 0 {
            bail!(AlphamatError::Config(
                "the quantum critic needs an input and at least one layer".into()
            ));
        }
        if !(1..=16).contains(&self.n_qubits) {
            bail!(AlphamatError::Config(format!(
                "n_qubits must be in 1..=16, got {}",
                self.n_qubits
            )));
        }
        if !(self.max_angle.is_finite() && self.max_angle > 0.0) {
            bail!(AlphamatError::Config(format!(
                "max_angle must be positive, got {}",
                self.max_angle
            )));
        }
        Ok(())
    }
}
