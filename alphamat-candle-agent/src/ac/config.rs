//! Configuration of the actor-critic agent.
use crate::{
    actor::ActorConfig,
    critic::{CriticConfig, QNetConfig},
    ent_coef::EntCoefMode,
    Device,
};
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ActorCritic`](super::ActorCritic).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActorCriticConfig {
    /// Configuration of the actor.
    pub actor_config: ActorConfig,

    /// Configuration of the critic, classical or quantum.
    pub critic_config: CriticConfig,

    /// Discount factor.
    pub gamma: f64,

    /// Soft update coefficient of the target networks.
    pub tau: f64,

    /// Entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// Minibatch size.
    pub batch_size: usize,

    /// Number of updates in an optimization step.
    pub n_updates_per_opt: usize,

    /// Seed of action sampling.
    pub seed: u64,

    /// Device.
    pub device: Device,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            actor_config: ActorConfig::default(),
            critic_config: CriticConfig::default(),
            gamma: 0.99,
            tau: 0.005,
            ent_coef_mode: EntCoefMode::default(),
            batch_size: 32,
            n_updates_per_opt: 1,
            seed: 42,
            device: Device::Cpu,
        }
    }
}

impl ActorCriticConfig {
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: ActorConfig) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the configuration of the critic.
    pub fn critic_config(mut self, v: CriticConfig) -> Self {
        self.critic_config = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the entropy coefficient.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of updates in an optimization step.
    pub fn n_updates_per_opt(mut self, v: usize) -> Self {
        self.n_updates_per_opt = v;
        self
    }

    /// Sets the seed of action sampling.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Checks the configuration before anything is built.
    ///
    /// The critic input must be the observation followed by the one-hot action.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            bail!(AlphamatError::Config(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            bail!(AlphamatError::Config(format!(
                "tau must be in [0, 1], got {}",
                self.tau
            )));
        }
        if self.batch_size == 0 || self.n_updates_per_opt == 0 {
            bail!(AlphamatError::Config(
                "batch_size and n_updates_per_opt must be positive".into()
            ));
        }

        let pi_config = match &self.actor_config.pi_config {
            Some(c) => c,
            None => bail!(AlphamatError::Config("pi_config is not set".into())),
        };
        pi_config.validate()?;
        let q_config: &QNetConfig = match &self.critic_config.q_config {
            Some(c) => c,
            None => bail!(AlphamatError::Config("q_config is not set".into())),
        };
        q_config.validate()?;
        let expected = pi_config.in_dim() + pi_config.out_dim();
        if q_config.in_dim() != expected {
            bail!(AlphamatError::Config(format!(
                "critic input must be obs_dim + n_actions = {}, got {}",
                expected,
                q_config.in_dim()
            )));
        }
        Ok(())
    }

    /// Constructs [`ActorCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ActorCriticConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
