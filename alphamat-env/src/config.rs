//! Configuration of [`DiscoveryEnv`](crate::DiscoveryEnv).
use crate::{ActionSetConfig, EstimatePrior, MatrixDistribution};
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Coefficients of the reward `-‖C - AB‖ - alpha * t - beta * cost`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RewardConfig {
    /// Penalty per elapsed step.
    pub alpha: f32,

    /// Penalty per unit of symbolic cost.
    pub beta: f32,

    /// Use the squared Frobenius norm.
    pub squared_error: bool,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.01,
            squared_error: false,
        }
    }
}

/// Configuration of [`DiscoveryEnv`](crate::DiscoveryEnv).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DiscoveryEnvConfig {
    /// Size of the square matrices.
    pub n: usize,

    /// Distribution of `A` and `B`.
    pub distribution: MatrixDistribution,

    /// Initial value of `C`.
    pub prior: EstimatePrior,

    /// Append `C` to the features of observations.
    pub include_estimate: bool,

    /// The action set.
    pub action_set: ActionSetConfig,

    /// Reward coefficients.
    pub reward: RewardConfig,

    /// An episode terminates when `‖C - AB‖ < epsilon`.
    pub epsilon: f32,

    /// An episode is truncated after this number of steps.
    pub max_steps: usize,

    /// Every action can be taken at most this many times per episode.
    pub max_action_uses: Option<usize>,
}

impl Default for DiscoveryEnvConfig {
    fn default() -> Self {
        Self {
            n: 2,
            distribution: MatrixDistribution::default(),
            prior: EstimatePrior::Zero,
            include_estimate: true,
            action_set: ActionSetConfig::default(),
            reward: RewardConfig::default(),
            epsilon: 1e-3,
            max_steps: 16,
            max_action_uses: None,
        }
    }
}

impl DiscoveryEnvConfig {
    /// Builds the configuration of an environment id `matmul-<n>x<n>`, optionally
    /// followed by `-outer`, `-scalar` or `-strassen`.
    ///
    /// ```
    /// use alphamat_env::{ActionSetConfig, DiscoveryEnvConfig};
    ///
    /// let config = DiscoveryEnvConfig::from_env_id("matmul-2x2-strassen").unwrap();
    /// assert_eq!(config.n, 2);
    /// assert_eq!(config.action_set, ActionSetConfig::Strassen);
    /// ```
    pub fn from_env_id(env_id: &str) -> Result<Self> {
        let invalid = || AlphamatError::Config(format!("invalid environment id {:?}", env_id));
        let mut parts = env_id.split('-');
        if parts.next() != Some("matmul") {
            bail!(invalid());
        }
        let (rows, cols) = parts
            .next()
            .and_then(|s| s.split_once('x'))
            .ok_or_else(invalid)?;
        let n: usize = rows.parse().map_err(|_| invalid())?;
        if cols.parse::<usize>().map_err(|_| invalid())? != n {
            bail!(AlphamatError::Config(format!(
                "environment id {:?} needs square matrices",
                env_id
            )));
        }
        let action_set = match parts.next() {
            None | Some("outer") => ActionSetConfig::OuterProducts { signed: false },
            Some("scalar") => ActionSetConfig::ScalarProducts { signed: false },
            Some("strassen") => ActionSetConfig::Strassen,
            Some(_) => bail!(invalid()),
        };
        if parts.next().is_some() {
            bail!(invalid());
        }

        let max_steps = match &action_set {
            ActionSetConfig::ScalarProducts { .. } => 2 * n * n * n,
            _ => 4 * n * n,
        };
        let config = Self::default()
            .n(n)
            .action_set(action_set)
            .max_steps(max_steps);
        config.validate()?;
        Ok(config)
    }

    /// Sets the size of the matrices.
    pub fn n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Sets the distribution of the matrices.
    pub fn distribution(mut self, distribution: MatrixDistribution) -> Self {
        self.distribution = distribution;
        self
    }

    /// Sets the initial value of the estimate.
    pub fn prior(mut self, prior: EstimatePrior) -> Self {
        self.prior = prior;
        self
    }

    /// Sets if the estimate is a part of observations.
    pub fn include_estimate(mut self, v: bool) -> Self {
        self.include_estimate = v;
        self
    }

    /// Sets the action set.
    pub fn action_set(mut self, action_set: ActionSetConfig) -> Self {
        self.action_set = action_set;
        self
    }

    /// Sets the reward coefficients.
    pub fn reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    /// Sets the error threshold of termination.
    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the maximum number of steps per episode.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the maximum number of uses of each action per episode.
    pub fn max_action_uses(mut self, v: Option<usize>) -> Self {
        self.max_action_uses = v;
        self
    }

    /// Width of the features of observations.
    pub fn obs_dim(&self) -> usize {
        match self.include_estimate {
            true => 3 * self.n * self.n,
            false => 2 * self.n * self.n,
        }
    }

    /// Checks the configuration, including the action set.
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            bail!(AlphamatError::Config("n must be positive".into()));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            bail!(AlphamatError::Config(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.max_steps == 0 {
            bail!(AlphamatError::Config("max_steps must be positive".into()));
        }
        if self.max_action_uses == Some(0) {
            bail!(AlphamatError::Config("max_action_uses must be positive".into()));
        }
        if !(self.reward.alpha.is_finite() && self.reward.beta.is_finite()) {
            bail!(AlphamatError::Config("reward coefficients must be finite".into()));
        }
        if let EstimatePrior::Constant(v) = self.prior {
            if !v.is_finite() {
                bail!(AlphamatError::Config("prior must be finite".into()));
            }
        }
        self.distribution.validate(self.n)?;
        self.action_set.build(self.n)?;
        Ok(())
    }

    /// Constructs [`DiscoveryEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DiscoveryEnvConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_env_ids() -> Result<()> {
        let config = DiscoveryEnvConfig::from_env_id("matmul-3x3")?;
        assert_eq!(config.n, 3);
        assert_eq!(config.action_set, ActionSetConfig::OuterProducts { signed: false });
        assert_eq!(
            DiscoveryEnvConfig::from_env_id("matmul-2x2-scalar")?.action_set,
            ActionSetConfig::ScalarProducts { signed: false }
        );
        for id in ["matmul-2x3", "matmul-0x0", "matmul-3x3-strassen", "conv-2x2", "matmul-2x2-x"] {
            assert!(DiscoveryEnvConfig::from_env_id(id).is_err(), "{}", id);
        }
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(DiscoveryEnvConfig::default().validate().is_ok());
        assert!(DiscoveryEnvConfig::default().n(0).validate().is_err());
        assert!(DiscoveryEnvConfig::default().epsilon(0.0).validate().is_err());
        assert!(DiscoveryEnvConfig::default()
            .max_action_uses(Some(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = DiscoveryEnvConfig::default()
            .n(3)
            .distribution(MatrixDistribution::Integer { low: -1, high: 1 })
            .prior(EstimatePrior::Constant(0.5))
            .max_action_uses(Some(2));
        let dir = TempDir::new("discovery_env_config")?;
        let path = dir.path().join("env.yaml");
        config.save(&path)?;
        assert_eq!(config, DiscoveryEnvConfig::load(&path)?);
        Ok(())
    }
}
