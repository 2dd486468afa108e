//! Entropy coefficient of the actor-critic agent.
use crate::opt::{Optimizer, OptimizerConfig};
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),
    /// Automatic tuning given `(target_entropy, learning_rate)`.
    Auto(f64, f64),
}

impl Default for EntCoefMode {
    fn default() -> Self {
        Self::Fix(0.01)
    }
}

/// The entropy coefficient.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                if !(alpha.is_finite() && alpha > 0.0) {
                    bail!(AlphamatError::Config(format!(
                        "the entropy coefficient must be positive, got {}",
                        alpha
                    )));
                }
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto(target_entropy, learning_rate) => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::default()
                    .learning_rate(learning_rate)
                    .build(crate::util::named_vars(&varmap)?)?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient, shape `(1,)`.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn alpha_scalar(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Update the parameter given `sum_a π(a|s) log π(a|s)` of each state in a batch.
    pub fn update(&mut self, neg_entropy: &Tensor) -> Result<()> {
        if let (Some(target_entropy), Some(opt)) = (self.target_entropy, &mut self.opt) {
            let loss = {
                let tmp = (neg_entropy.detach() + target_entropy)?;
                (self.log_alpha.broadcast_mul(&tmp)? * -1f64)?.mean_all()?
            };
            opt.backward_step(&loss)?;
        }
        Ok(())
    }

    /// Save the parameter and the optimizer state into `dir`.
    pub fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.save(dir.join("ent_coef.safetensors"))?;
        if let Some(opt) = &self.opt {
            opt.save(dir.join("ent_coef_opt.safetensors"))?;
        }
        info!("Save entropy coefficient to {:?}", dir);
        Ok(())
    }

    /// Load the parameter and the optimizer state from `dir`.
    pub fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.load(dir.join("ent_coef.safetensors"))?;
        if let Some(opt) = &mut self.opt {
            opt.load(dir.join("ent_coef_opt.safetensors"))?;
        }
        info!("Load entropy coefficient from {:?}", dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), Device::Cpu)?;
        let neg_entropy = Tensor::new(&[-0.1f32, -0.3], &Device::Cpu)?;
        ent_coef.update(&neg_entropy)?;
        assert!((ent_coef.alpha_scalar()? - 0.2).abs() < 1e-6);
        assert!(EntCoef::new(EntCoefMode::Fix(0.0), Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn test_auto_moves_towards_target() -> Result<()> {
        // the entropy is below the target, so alpha grows
        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(1.0, 0.01), Device::Cpu)?;
        let neg_entropy = Tensor::new(&[-0.1f32, -0.3], &Device::Cpu)?;
        for _ in 0..10 {
            ent_coef.update(&neg_entropy)?;
        }
        assert!(ent_coef.alpha_scalar()? > 1.0);
        Ok(())
    }
}
