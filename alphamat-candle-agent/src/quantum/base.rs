use super::{Circuit, Encoding, QuantumCriticConfig};
use crate::model::SubModel2;
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use candle_core::{Device, Module, Tensor, D};
use candle_nn::{linear, Init, Linear, VarBuilder};
use std::f64::consts::PI;

/// Action-value function evaluated by a variational quantum circuit.
///
/// The state-action input is projected to one rotation angle per qubit, the
/// circuit is simulated and the `<Z_j>` readouts are linearly combined into the
/// action value.
pub struct QuantumCritic {
    config: QuantumCriticConfig,
    device: Device,
    encoder: Linear,
    weights: Tensor,
    readout: Linear,
    circuit: Circuit,
}

impl QuantumCritic {
    /// Returns the rotation angles for the given inputs, shape `(batch_size, n_qubits)`.
    ///
    /// Fails with [`AlphamatError::CircuitEvaluation`] when an angle is not finite,
    /// or exceeds `max_angle` in magnitude and clipping is disabled.
    pub fn angles(&self, xs: &Tensor) -> Result<Tensor> {
        let pre = self.encoder.forward(xs)?;
        let angles = match self.config.encoding {
            Encoding::Tanh => (pre.tanh()? * PI)?,
            Encoding::Identity => pre,
        };

        let max_angle = self.config.max_angle;
        let values = angles.flatten_all()?.to_vec1::<f32>()?;
        if values.iter().any(|v| !v.is_finite()) {
            bail!(AlphamatError::CircuitEvaluation(
                "encoded rotation angles are not finite".into()
            ));
        }
        let largest = values.iter().fold(0f32, |m, v| m.max(v.abs())) as f64;
        if largest > max_angle {
            if !self.config.clip_angles {
                bail!(AlphamatError::CircuitEvaluation(format!(
                    "encoded rotation angle {} exceeds {}",
                    largest, max_angle
                )));
            }
            return Ok(angles.clamp(-max_angle, max_angle)?);
        }
        Ok(angles)
    }

    /// Returns the circuit weights, shape `(n_layers, n_qubits)`.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns the simulated circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }
}

impl SubModel2 for QuantumCritic {
    type Config = QuantumCriticConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let vb = vb.pp("vqc");
        let encoder = linear(config.in_dim, config.n_qubits, vb.pp("enc"))?;
        let weights = vb.get_with_hints(
            (config.n_layers, config.n_qubits),
            "weights",
            Init::Uniform { lo: -PI, up: PI },
        )?;
        let readout = linear(config.n_qubits, 1, vb.pp("readout"))?;
        let circuit = Circuit::new(config.n_qubits, config.n_layers, config.reupload, &device)?;

        Ok(Self {
            config,
            device,
            encoder,
            weights,
            readout,
            circuit,
        })
    }

    fn forward(&self, obs: &Self::Input1, act: &Self::Input2) -> Result<Tensor> {
        let obs = obs.to_device(&self.device)?;
        let act = act.to_device(&self.device)?;
        let xs = Tensor::cat(&[obs, act], D::Minus1)?;
        let angles = self.angles(&xs)?;
        let expz = self.circuit.expectations(&angles, &self.weights)?;
        Ok(self.readout.forward(&expz)?)
    }
}
