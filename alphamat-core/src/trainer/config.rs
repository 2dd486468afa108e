//! Configuration of [`Trainer`](super::Trainer).
use crate::error::AlphamatError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
///
/// Intervals counted in episodes are disabled when set to `0`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// The number of training episodes.
    pub max_episodes: usize,

    /// Optional budget of environment steps, checked at the end of each episode.
    pub max_env_steps: Option<usize>,

    /// The number of stored transitions required before optimization starts.
    pub warmup_period: usize,

    /// Interval of optimization steps in environment steps.
    pub opt_interval: usize,

    /// Interval of evaluation in episodes.
    pub eval_interval: usize,

    /// Interval of saving checkpoints in episodes.
    pub save_interval: usize,

    /// Interval of flushing records in episodes.
    pub flush_record_interval: usize,

    /// Reward of the terminal transition stored when an episode diverges.
    pub divergence_penalty: f32,

    /// Where to save checkpoints and the best model.
    pub model_dir: Option<String>,

    /// Random seed of the training environment.
    pub seed: i64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_episodes: 100,
            max_env_steps: None,
            warmup_period: 0,
            opt_interval: 1,
            eval_interval: 0,
            save_interval: 0,
            flush_record_interval: 1,
            divergence_penalty: -100.0,
            model_dir: None,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of training episodes.
    pub fn max_episodes(mut self, v: usize) -> Self {
        self.max_episodes = v;
        self
    }

    /// Sets the budget of environment steps.
    pub fn max_env_steps(mut self, v: Option<usize>) -> Self {
        self.max_env_steps = v;
        self
    }

    /// Sets warmup period in stored transitions.
    pub fn warmup_period(mut self, warmup_period: usize) -> Self {
        self.warmup_period = warmup_period;
        self
    }

    /// Sets the interval of optimization in environment steps.
    pub fn opt_interval(mut self, opt_interval: usize) -> Self {
        self.opt_interval = opt_interval;
        self
    }

    /// Sets the interval of evaluation in episodes.
    pub fn eval_interval(mut self, v: usize) -> Self {
        self.eval_interval = v;
        self
    }

    /// Sets the interval of saving checkpoints in episodes.
    pub fn save_interval(mut self, save_interval: usize) -> Self {
        self.save_interval = save_interval;
        self
    }

    /// Sets the interval of flushing records in episodes.
    pub fn flush_record_interval(mut self, flush_record_interval: usize) -> Self {
        self.flush_record_interval = flush_record_interval;
        self
    }

    /// Sets the reward of diverged transitions.
    pub fn divergence_penalty(mut self, v: f32) -> Self {
        self.divergence_penalty = v;
        self
    }

    /// Sets the directory of checkpoints and the best model.
    pub fn model_dir<T: Into<String>>(mut self, model_dir: T) -> Self {
        self.model_dir = Some(model_dir.into());
        self
    }

    /// Sets the random seed of the training environment.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_episodes == 0 {
            bail!(AlphamatError::Config("max_episodes must be positive".into()));
        }
        if self.opt_interval == 0 {
            bail!(AlphamatError::Config("opt_interval must be positive".into()));
        }
        if !self.divergence_penalty.is_finite() {
            bail!(AlphamatError::Config("divergence_penalty must be finite".into()));
        }
        if self.save_interval > 0 && self.model_dir.is_none() {
            bail!(AlphamatError::Config("save_interval requires model_dir".into()));
        }
        Ok(())
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
