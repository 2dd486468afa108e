//! Configuration of an experiment.
use alphamat_candle_agent::{
    mlp::MlpConfig,
    opt::OptimizerConfig,
    quantum::QuantumCriticConfig,
    ActorConfig, ActorCriticConfig, CriticConfig, QNetConfig,
};
use alphamat_core::{error::AlphamatError, replay_buffer::SimpleReplayBufferConfig, TrainerConfig};
use alphamat_env::DiscoveryEnvConfig;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    str::FromStr,
};

const HIDDEN_UNITS: [usize; 2] = [64, 64];
const N_QUBITS: usize = 4;
const N_LAYERS: usize = 2;
const LR_ACTOR: f64 = 3e-4;
const LR_CRITIC: f64 = 1e-3;
const REPLAY_BUFFER_CAPACITY: usize = 10_000;
const WARMUP_PERIOD: usize = 64;
const N_EVAL_EPISODES: usize = 8;

/// Implementation of the critic.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum CriticMode {
    /// Multilayer perceptron.
    #[default]
    Classical,

    /// Variational quantum circuit.
    Quantum,
}

impl FromStr for CriticMode {
    type Err = AlphamatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classical" => Ok(Self::Classical),
            "quantum" => Ok(Self::Quantum),
            _ => Err(AlphamatError::Config(format!(
                "critic mode must be classical or quantum, got {:?}",
                s
            ))),
        }
    }
}

/// Everything a training run is built from.
///
/// [`ExperimentConfig::new`] derives the model sizes from the environment, so
/// that the actor outputs one logit per action and the critic reads the
/// observation followed by the one-hot action.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ExperimentConfig {
    /// Implementation of the critic.
    pub critic_mode: CriticMode,

    /// Training environment.
    pub env_config: DiscoveryEnvConfig,

    /// Replay buffer.
    pub replay_buffer_config: SimpleReplayBufferConfig,

    /// Actor-critic agent.
    pub agent_config: ActorCriticConfig,

    /// Training loop.
    pub trainer_config: TrainerConfig,

    /// Number of episodes of an evaluation.
    pub n_eval_episodes: usize,

    /// Random seed of the run.
    pub seed: u64,
}

impl ExperimentConfig {
    /// Creates the configuration of an environment id such as `matmul-2x2-strassen`.
    pub fn new(critic_mode: CriticMode, env_id: &str) -> Result<Self> {
        Self::from_env_config(critic_mode, DiscoveryEnvConfig::from_env_id(env_id)?)
    }

    /// Creates the configuration of the given environment.
    pub fn from_env_config(critic_mode: CriticMode, env_config: DiscoveryEnvConfig) -> Result<Self> {
        env_config.validate()?;
        let obs_dim = env_config.obs_dim();
        let n_actions = env_config.action_set.build(env_config.n)?.len();

        let q_config = match critic_mode {
            CriticMode::Classical => QNetConfig::Classical(MlpConfig::new(
                obs_dim + n_actions,
                HIDDEN_UNITS.to_vec(),
                1,
                false,
            )),
            CriticMode::Quantum => QNetConfig::Quantum(
                QuantumCriticConfig::new(obs_dim + n_actions, N_QUBITS, N_LAYERS).reupload(true),
            ),
        };
        let agent_config = ActorCriticConfig::default()
            .actor_config(
                ActorConfig::default()
                    .pi_config(MlpConfig::new(obs_dim, HIDDEN_UNITS.to_vec(), n_actions, false))
                    .opt_config(OptimizerConfig::default().learning_rate(LR_ACTOR)),
            )
            .critic_config(
                CriticConfig::default()
                    .q_config(q_config)
                    .opt_config(OptimizerConfig::default().learning_rate(LR_CRITIC)),
            );
        let trainer_config = TrainerConfig::default()
            .warmup_period(WARMUP_PERIOD)
            .flush_record_interval(10);

        Ok(Self {
            critic_mode,
            env_config,
            replay_buffer_config: SimpleReplayBufferConfig::default()
                .capacity(REPLAY_BUFFER_CAPACITY),
            agent_config,
            trainer_config,
            n_eval_episodes: N_EVAL_EPISODES,
            seed: 42,
        }
        .seed(42))
    }

    /// Sets the number of training episodes.
    pub fn n_episodes(mut self, v: usize) -> Self {
        self.trainer_config = self.trainer_config.max_episodes(v);
        self
    }

    /// Sets the directory of checkpoints and the best model.
    pub fn model_dir<T: Into<String>>(mut self, v: T) -> Self {
        self.trainer_config = self.trainer_config.model_dir(v);
        self
    }

    /// Sets the number of episodes of an evaluation.
    pub fn n_eval_episodes(mut self, v: usize) -> Self {
        self.n_eval_episodes = v;
        self
    }

    /// Sets the seed of the run, from which the seeds of the environment, the
    /// replay buffer and the agent are derived.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.trainer_config = self.trainer_config.seed(seed as i64);
        self.replay_buffer_config = self.replay_buffer_config.seed(seed.wrapping_add(1));
        self.agent_config = self.agent_config.seed(seed.wrapping_add(2));
        self
    }

    /// Seed of the evaluation environment, distinct from the training one.
    pub fn eval_seed(&self) -> i64 {
        (self.seed as i64).wrapping_add(1_000_003)
    }

    /// Checks all parts of the configuration and their consistency.
    pub fn validate(&self) -> Result<()> {
        self.env_config.validate()?;
        self.replay_buffer_config.validate()?;
        self.agent_config.validate()?;
        self.trainer_config.validate()?;

        let q_config = &self.agent_config.critic_config.q_config;
        let mode_matches = matches!(
            (self.critic_mode, q_config),
            (CriticMode::Classical, Some(QNetConfig::Classical(_)))
                | (CriticMode::Quantum, Some(QNetConfig::Quantum(_)))
        );
        if !mode_matches {
            bail!(AlphamatError::Config(format!(
                "critic mode {:?} does not match the critic configuration",
                self.critic_mode
            )));
        }

        let obs_dim = self.env_config.obs_dim();
        let n_actions = self.env_config.action_set.build(self.env_config.n)?.len();
        if let Some(pi_config) = &self.agent_config.actor_config.pi_config {
            if pi_config.in_dim() != obs_dim || pi_config.out_dim() != n_actions {
                bail!(AlphamatError::Config(format!(
                    "the actor must map {} features to {} actions, got {} to {}",
                    obs_dim,
                    n_actions,
                    pi_config.in_dim(),
                    pi_config.out_dim()
                )));
            }
        }
        if self.n_eval_episodes == 0 {
            bail!(AlphamatError::Config("n_eval_episodes must be positive".into()));
        }
        Ok(())
    }

    /// Constructs [`ExperimentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ExperimentConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphamat_core::error::as_alphamat_error;
    use tempdir::TempDir;

    fn is_config_error(res: Result<()>) -> bool {
        match res {
            Err(err) => as_alphamat_error(&err).map(|e| e.kind()) == Some("config"),
            Ok(()) => false,
        }
    }

    #[test]
    fn test_dimensions_follow_env() -> Result<()> {
        let config = ExperimentConfig::new(CriticMode::Quantum, "matmul-2x2-strassen")?;
        config.validate()?;
        let pi_config = config.agent_config.actor_config.pi_config.as_ref().unwrap();
        assert_eq!(pi_config.in_dim(), 12);
        assert_eq!(pi_config.out_dim(), 7);
        match config.agent_config.critic_config.q_config.as_ref().unwrap() {
            QNetConfig::Quantum(q) => assert_eq!(q.in_dim, 19),
            _ => panic!("expected a quantum critic"),
        }
        Ok(())
    }

    #[test]
    fn test_seed_is_propagated() -> Result<()> {
        let config = ExperimentConfig::new(CriticMode::Classical, "matmul-2x2")?.seed(7);
        assert_eq!(config.trainer_config.seed, 7);
        assert_eq!(config.replay_buffer_config.seed, 8);
        assert_eq!(config.agent_config.seed, 9);
        Ok(())
    }

    #[test]
    fn test_validate() -> Result<()> {
        let config = ExperimentConfig::new(CriticMode::Classical, "matmul-2x2")?;
        assert!(config.validate().is_ok());

        let mut c = config.clone();
        c.critic_mode = CriticMode::Quantum;
        assert!(is_config_error(c.validate()));

        let mut c = config.clone();
        c.env_config = c.env_config.n(3);
        assert!(is_config_error(c.validate()));

        let mut c = config.clone();
        c.replay_buffer_config = c.replay_buffer_config.capacity(0);
        assert!(is_config_error(c.validate()));

        let mut c = config;
        c.agent_config = c.agent_config.tau(2.0);
        assert!(is_config_error(c.validate()));

        assert!(ExperimentConfig::new(CriticMode::Classical, "matmul-2x3").is_err());
        assert!("hybrid".parse::<CriticMode>().is_err());
        assert_eq!("quantum".parse::<CriticMode>()?, CriticMode::Quantum);
        Ok(())
    }

    #[test]
    fn test_yaml_round_trip() -> Result<()> {
        let tmp = TempDir::new("experiment_config")?;
        let path = tmp.path().join("experiment.yaml");
        let config = ExperimentConfig::new(CriticMode::Quantum, "matmul-2x2-scalar")?
            .n_episodes(3)
            .model_dir("model");
        config.save(&path)?;
        assert_eq!(ExperimentConfig::load(&path)?, config);
        Ok(())
    }
}
