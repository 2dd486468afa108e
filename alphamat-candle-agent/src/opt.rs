//! Optimizers.
//!
//! The optimizers keep their state (moments and step count) in tensors keyed by
//! the names of the variables, so that the state can be written to and read from
//! safetensors files next to the parameters.
use anyhow::{Context, Result};
use candle_core::{backprop::GradStore, safetensors, DType, Tensor, Var};
use log::info;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};

/// Configuration of optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer with decoupled weight decay.
    Adam {
        /// Learning rate.
        lr: f64,
        #[serde(default = "default_beta1")]
        /// Decay of the first moment.
        beta1: f64,
        #[serde(default = "default_beta2")]
        /// Decay of the second moment.
        beta2: f64,
        #[serde(default = "default_eps")]
        /// Term added to the denominator.
        eps: f64,
        #[serde(default)]
        /// Weight decay.
        weight_decay: f64,
    },

    /// Plain stochastic gradient descent.
    Sgd {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            lr: 3e-4,
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            weight_decay: 0.0,
        }
    }
}

impl OptimizerConfig {
    /// Constructs an optimizer of the given named variables.
    pub fn build(&self, vars: Vec<(String, Var)>) -> Result<Optimizer> {
        let moments = match self {
            Self::Adam { .. } => vars
                .iter()
                .map(|(_, var)| {
                    let m = Var::zeros(var.dims(), DType::F32, var.device())?;
                    let v = Var::zeros(var.dims(), DType::F32, var.device())?;
                    Ok((m, v))
                })
                .collect::<Result<Vec<_>>>()?,
            Self::Sgd { .. } => vec![],
        };

        Ok(Optimizer {
            config: self.clone(),
            vars,
            moments,
            t: 0,
        })
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::Adam {
                beta1,
                beta2,
                eps,
                weight_decay,
                ..
            } => Self::Adam {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Sgd { .. } => Self::Sgd { lr },
        }
    }

    /// Returns the learning rate.
    pub fn get_learning_rate(&self) -> f64 {
        match self {
            Self::Adam { lr, .. } | Self::Sgd { lr } => *lr,
        }
    }
}

/// Optimizer updating a fixed set of named variables.
pub struct Optimizer {
    config: OptimizerConfig,
    vars: Vec<(String, Var)>,
    moments: Vec<(Var, Var)>,
    t: usize,
}

impl Optimizer {
    /// Computes the gradients of `loss` and applies an update.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Applies an update with the given gradients.
    ///
    /// Variables without gradient are left unchanged.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.t += 1;
        match self.config {
            OptimizerConfig::Sgd { lr } => {
                for (_, var) in self.vars.iter() {
                    if let Some(g) = grads.get(var.as_tensor()) {
                        var.set(&(var.as_tensor() - (g * lr)?)?)?;
                    }
                }
            }
            OptimizerConfig::Adam {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let scale_m = 1.0 / (1.0 - beta1.powi(self.t as i32));
                let scale_v = 1.0 / (1.0 - beta2.powi(self.t as i32));
                for ((_, var), (m, v)) in self.vars.iter().zip(self.moments.iter()) {
                    let g = match grads.get(var.as_tensor()) {
                        Some(g) => g,
                        None => continue,
                    };
                    let next_m = ((m.as_tensor() * beta1)? + (g * (1.0 - beta1))?)?;
                    let next_v = ((v.as_tensor() * beta2)? + (g.sqr()? * (1.0 - beta2))?)?;
                    let m_hat = (&next_m * scale_m)?;
                    let v_hat = (&next_v * scale_v)?;
                    let delta = (m_hat / (v_hat.sqrt()? + eps)?)?;
                    let theta = (var.as_tensor() * (1.0 - lr * weight_decay))?;
                    var.set(&(theta - (delta * lr)?)?)?;
                    m.set(&next_m)?;
                    v.set(&next_v)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the number of updates applied so far.
    pub fn n_steps(&self) -> usize {
        self.t
    }

    /// Saves the state of the optimizer.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let device = match self.vars.first() {
            Some((_, var)) => var.device().clone(),
            None => candle_core::Device::Cpu,
        };
        let mut tensors = HashMap::new();
        tensors.insert("step".to_string(), Tensor::new(&[self.t as u32], &device)?);
        for ((name, _), (m, v)) in self.vars.iter().zip(self.moments.iter()) {
            tensors.insert(format!("m.{}", name), m.as_tensor().clone());
            tensors.insert(format!("v.{}", name), v.as_tensor().clone());
        }
        safetensors::save(&tensors, &path)?;
        info!("Save optimizer state to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the state of the optimizer.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        let device = match self.vars.first() {
            Some((_, var)) => var.device().clone(),
            None => candle_core::Device::Cpu,
        };
        let tensors = safetensors::load(&path, &device)?;
        let step = tensors.get("step").context("optimizer state has no step")?;
        self.t = step.to_vec1::<u32>()?[0] as usize;
        for ((name, _), (m, v)) in self.vars.iter().zip(self.moments.iter()) {
            let key_m = format!("m.{}", name);
            let key_v = format!("v.{}", name);
            m.set(tensors.get(&key_m).with_context(|| format!("missing {}", key_m))?)?;
            v.set(tensors.get(&key_v).with_context(|| format!("missing {}", key_v))?)?;
        }
        info!("Load optimizer state from {:?}", path.as_ref());
        Ok(())
    }
}
