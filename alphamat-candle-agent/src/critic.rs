//! Critic of the actor-critic agent.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    quantum::{QuantumCritic, QuantumCriticConfig},
    util::{named_vars, one_hot, track, CriticLoss},
};
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of the action-value function, selecting its implementation.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum QNetConfig {
    /// Multilayer perceptron over `[obs, one_hot(act)]` with a single output.
    Classical(MlpConfig),

    /// Variational quantum circuit over `[obs, one_hot(act)]`.
    Quantum(QuantumCriticConfig),
}

impl QNetConfig {
    /// Returns the width of the state-action input.
    pub fn in_dim(&self) -> usize {
        match self {
            Self::Classical(config) => config.in_dim(),
            Self::Quantum(config) => config.in_dim,
        }
    }

    /// Checks the configuration of the selected implementation.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Classical(config) => {
                config.validate()?;
                if config.out_dim() != 1 {
                    bail!(AlphamatError::Config(format!(
                        "the classical critic outputs a single value, got out_dim {}",
                        config.out_dim()
                    )));
                }
                Ok(())
            }
            Self::Quantum(config) => config.validate(),
        }
    }
}

/// Action-value function, classical or quantum.
pub enum QNet {
    /// Multilayer perceptron.
    Classical(Mlp),

    /// Variational quantum circuit.
    Quantum(QuantumCritic),
}

impl SubModel2 for QNet {
    type Config = QNetConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        match config {
            QNetConfig::Classical(config) => Ok(Self::Classical(Mlp::build(vb, config)?)),
            QNetConfig::Quantum(config) => Ok(Self::Quantum(QuantumCritic::build(vb, config)?)),
        }
    }

    fn forward(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        match self {
            Self::Classical(q) => SubModel2::forward(q, obs, act),
            Self::Quantum(q) => q.forward(obs, act),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Critic`].
pub struct CriticConfig {
    /// Configuration of the action-value function.
    pub q_config: Option<QNetConfig>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Loss between predictions and bootstrapped targets.
    pub critic_loss: CriticLoss,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
            critic_loss: CriticLoss::Mse,
        }
    }
}

impl CriticConfig {
    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: QNetConfig) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the loss function.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Constructs [`CriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CriticConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Critic with a target network.
///
/// It takes observations and actions as inputs and outputs action values. The
/// target network has its own [`VarMap`] with the same variable names, and is
/// changed only by [`Critic::soft_update`].
pub struct Critic {
    n_actions: usize,
    device: Device,
    varmap: VarMap,
    varmap_tgt: VarMap,
    q: QNet,
    q_tgt: QNet,
    critic_loss: CriticLoss,
    opt: Optimizer,
}

impl Critic {
    /// Constructs [`Critic`] for `n_actions` actions.
    pub fn build(config: CriticConfig, n_actions: usize, device: Device) -> Result<Self> {
        let q_config = config.q_config.context("q_config is not set.")?;
        q_config.validate()?;

        let varmap = VarMap::new();
        let q = QNet::build(
            VarBuilder::from_varmap(&varmap, DType::F32, &device),
            q_config.clone(),
        )?;
        let varmap_tgt = VarMap::new();
        let q_tgt = QNet::build(
            VarBuilder::from_varmap(&varmap_tgt, DType::F32, &device),
            q_config,
        )?;
        track(&varmap_tgt, &varmap, 1.0)?;
        let opt = config.opt_config.build(named_vars(&varmap)?)?;

        Ok(Self {
            n_actions,
            device,
            varmap,
            varmap_tgt,
            q,
            q_tgt,
            critic_loss: config.critic_loss,
            opt,
        })
    }

    fn forward(q: &QNet, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Ok(q.forward(obs, act)?.squeeze(D::Minus1)?)
    }

    fn forward_all(&self, q: &QNet, obs: &Tensor) -> Result<Tensor> {
        let (batch_size, dim) = obs.dims2()?;
        let n = self.n_actions;
        let obs = obs
            .unsqueeze(1)?
            .broadcast_as((batch_size, n, dim))?
            .reshape((batch_size * n, dim))?;
        let ixs: Vec<u32> = (0..batch_size).flat_map(|_| 0..n as u32).collect();
        let act = one_hot(&ixs, n, &self.device)?;
        Ok(Self::forward(q, &obs, &act)?.reshape((batch_size, n))?)
    }

    /// Returns `Q(s, a)` for action indices `act`, shape `(batch_size,)`.
    pub fn q_value(&self, obs: &Tensor, act: &[u32]) -> Result<Tensor> {
        let act = one_hot(act, self.n_actions, &self.device)?;
        Self::forward(&self.q, obs, &act)
    }

    /// Returns `Q(s, a)` of the target network, shape `(batch_size,)`.
    pub fn q_value_tgt(&self, obs: &Tensor, act: &[u32]) -> Result<Tensor> {
        let act = one_hot(act, self.n_actions, &self.device)?;
        Ok(Self::forward(&self.q_tgt, obs, &act)?.detach())
    }

    /// Returns `Q(s, a)` for every action, shape `(batch_size, n_actions)`.
    pub fn q_values_all(&self, obs: &Tensor) -> Result<Tensor> {
        self.forward_all(&self.q, obs)
    }

    /// Returns `Q(s, a)` of the target network for every action.
    pub fn q_values_all_tgt(&self, obs: &Tensor) -> Result<Tensor> {
        Ok(self.forward_all(&self.q_tgt, obs)?.detach())
    }

    /// Regresses `Q(s, a)` on `tgt` with one optimizer step and returns the loss.
    pub fn update(&mut self, obs: &Tensor, act: &[u32], tgt: &Tensor) -> Result<f32> {
        let pred = self.q_value(obs, act)?;
        let loss = self.critic_loss.loss(&pred, &tgt.detach())?;
        self.opt.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// Moves the target network towards the critic: `θ_t ← τθ + (1 - τ)θ_t`.
    pub fn soft_update(&self, tau: f64) -> Result<()> {
        track(&self.varmap_tgt, &self.varmap, tau)
    }

    /// Returns the variables of the critic.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Returns the variables of the target network.
    pub fn get_varmap_tgt(&self) -> &VarMap {
        &self.varmap_tgt
    }

    /// Saves the parameters, the target parameters and the optimizer state in `dir`.
    pub fn save<T: AsRef<Path>>(&self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.save(dir.join("critic.safetensors"))?;
        self.varmap_tgt.save(dir.join("critic_tgt.safetensors"))?;
        self.opt.save(dir.join("critic_opt.safetensors"))?;
        info!("Save critic to {:?}", dir);
        Ok(())
    }

    /// Loads what [`Critic::save`] wrote.
    pub fn load<T: AsRef<Path>>(&mut self, dir: T) -> Result<()> {
        let dir = dir.as_ref();
        self.varmap.load(dir.join("critic.safetensors"))?;
        self.varmap_tgt.load(dir.join("critic_tgt.safetensors"))?;
        self.opt.load(dir.join("critic_opt.safetensors"))?;
        info!("Load critic from {:?}", dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::Encoding;

    const N_ACTIONS: usize = 3;
    const OBS_DIM: usize = 4;

    fn batch() -> Result<(Tensor, Vec<u32>, Tensor)> {
        let obs = Tensor::new(
            &[
                [0.1f32, -0.4, 0.3, 0.9],
                [-0.7, 0.2, 0.5, -0.1],
                [0.4, 0.4, -0.6, 0.2],
                [0.0, -0.3, 0.8, -0.5],
            ],
            &Device::Cpu,
        )?;
        let act = vec![0, 2, 1, 2];
        let tgt = Tensor::new(&[0.5f32, -0.25, 0.75, -0.5], &Device::Cpu)?;
        Ok((obs, act, tgt))
    }

    fn classical() -> QNetConfig {
        QNetConfig::Classical(MlpConfig::new(OBS_DIM + N_ACTIONS, vec![16], 1, false))
    }

    fn quantum() -> QNetConfig {
        QNetConfig::Quantum(
            QuantumCriticConfig::new(OBS_DIM + N_ACTIONS, 3, 2).encoding(Encoding::Tanh),
        )
    }

    fn regression_loss_decreases(q_config: QNetConfig) -> Result<()> {
        let config = CriticConfig::default()
            .q_config(q_config)
            .opt_config(OptimizerConfig::default().learning_rate(0.01));
        let mut critic = Critic::build(config, N_ACTIONS, Device::Cpu)?;
        let (obs, act, tgt) = batch()?;

        let q = critic.q_value(&obs, &act)?;
        assert_eq!(q.dims(), [4]);
        assert!(q.to_vec1::<f32>()?.iter().all(|v| v.is_finite()));
        assert_eq!(critic.q_values_all(&obs)?.dims(), [4, N_ACTIONS]);

        let first = critic.update(&obs, &act, &tgt)?;
        let mut last = first;
        for _ in 0..100 {
            last = critic.update(&obs, &act, &tgt)?;
        }
        assert!(last.is_finite());
        assert!(last < first, "{} >= {}", last, first);
        Ok(())
    }

    #[test]
    fn test_classical_critic_learns() -> Result<()> {
        regression_loss_decreases(classical())
    }

    #[test]
    fn test_quantum_critic_learns() -> Result<()> {
        regression_loss_decreases(quantum())
    }

    #[test]
    fn test_q_values_all_matches_q_value() -> Result<()> {
        for q_config in [classical(), quantum()] {
            let critic = Critic::build(
                CriticConfig::default().q_config(q_config),
                N_ACTIONS,
                Device::Cpu,
            )?;
            let (obs, _, _) = batch()?;
            let all = critic.q_values_all(&obs)?.to_vec2::<f32>()?;
            for a in 0..N_ACTIONS as u32 {
                let q = critic.q_value(&obs, &[a; 4])?.to_vec1::<f32>()?;
                for (b, v) in q.iter().enumerate() {
                    assert!((all[b][a as usize] - v).abs() < 1e-5);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_target_starts_as_copy() -> Result<()> {
        let mut critic = Critic::build(
            CriticConfig::default().q_config(classical()),
            N_ACTIONS,
            Device::Cpu,
        )?;
        let (obs, act, tgt) = batch()?;
        let q = critic.q_value(&obs, &act)?.to_vec1::<f32>()?;
        let q_tgt = critic.q_value_tgt(&obs, &act)?.to_vec1::<f32>()?;
        assert_eq!(q, q_tgt);

        critic.update(&obs, &act, &tgt)?;
        let q = critic.q_value(&obs, &act)?.to_vec1::<f32>()?;
        assert_ne!(q, critic.q_value_tgt(&obs, &act)?.to_vec1::<f32>()?);
        critic.soft_update(1.0)?;
        assert_eq!(q, critic.q_value_tgt(&obs, &act)?.to_vec1::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_classical_output_must_be_scalar() {
        let q_config = QNetConfig::Classical(MlpConfig::new(OBS_DIM + N_ACTIONS, vec![8], 2, false));
        let config = CriticConfig::default().q_config(q_config);
        assert!(Critic::build(config, N_ACTIONS, Device::Cpu).is_err());
    }
}
