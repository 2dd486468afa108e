//! Discovery of matrix multiplication algorithms with an off-policy
//! actor-critic agent, whose critic is a classical network or a variational
//! quantum circuit.
//!
//! The workspace consists of the following crates:
//!
//! * `alphamat-core` provides the traits of environments, agents and replay
//!   buffers, records and the [`Trainer`](alphamat_core::Trainer).
//! * `alphamat-env` provides the discovery environment
//!   [`DiscoveryEnv`] and its evaluator.
//! * `alphamat-candle-agent` provides the actor-critic agent based on
//!   [candle](https://crates.io/crates/candle-core).
//! * `alphamat-tensorboard` writes records which can be shown in TensorBoard.
//!
//! This crate assembles them into an experiment.
//!
//! ```no_run
//! use alphamat::{run, CriticMode};
//! use alphamat_core::record::BufferedRecorder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut recorder = BufferedRecorder::new();
//! let summary = run(CriticMode::Quantum, "matmul-2x2-strassen", 200, &mut recorder)?;
//! println!("{:?}", summary.eval);
//! # Ok(())
//! # }
//! ```
mod config;
pub use config::{CriticMode, ExperimentConfig};

use alphamat_candle_agent::ActorCritic;
use alphamat_core::{
    record::AggregateRecorder,
    replay_buffer::{SimpleReplayBuffer, SimpleStepProcessor, SimpleStepProcessorConfig},
    Agent, Configurable, StopSignal, Trainer, TrainingSummary,
};
use alphamat_env::{DiscoveryEnv, DiscoveryEvaluator, EvalStats, MatmulActBatch, MatmulObsBatch};
use anyhow::Result;
use log::info;
use serde::Serialize;
use std::path::Path;

/// Replay buffer of the discovery environment.
pub type ReplayBuffer = SimpleReplayBuffer<MatmulObsBatch, MatmulActBatch>;

/// Step processor of the discovery environment.
pub type StepProc = SimpleStepProcessor<DiscoveryEnv, MatmulObsBatch, MatmulActBatch>;

/// The actor-critic agent of the discovery environment.
pub type DiscoveryAgent = ActorCritic<DiscoveryEnv, ReplayBuffer>;

/// Outcome of a run.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RunSummary {
    /// Implementation of the critic.
    pub critic_mode: CriticMode,

    /// Outcome of the training loop.
    pub training: TrainingSummary,

    /// Evaluation of the agent at the end of training.
    pub eval: EvalStats,
}

/// A training run built from an [`ExperimentConfig`].
pub struct Experiment {
    config: ExperimentConfig,
    agent: DiscoveryAgent,
    trainer: Trainer<DiscoveryEnv, StepProc, ReplayBuffer>,
}

impl Experiment {
    /// Validates the configuration and builds the agent and the trainer.
    pub fn build(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let agent = DiscoveryAgent::build(config.agent_config.clone())?;
        let trainer = Trainer::build(
            config.trainer_config.clone(),
            config.env_config.clone(),
            SimpleStepProcessorConfig::default(),
            config.replay_buffer_config.clone(),
        )?;
        info!(
            "Built experiment with {:?} critic on {}x{} matrices",
            config.critic_mode, config.env_config.n, config.env_config.n
        );
        Ok(Self {
            config,
            agent,
            trainer,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Returns the agent.
    pub fn agent(&self) -> &DiscoveryAgent {
        &self.agent
    }

    /// Returns a handle stopping the run at the next episode boundary.
    pub fn stop_signal(&self) -> StopSignal {
        self.trainer.stop_signal()
    }

    /// Trains the agent from scratch, then evaluates it.
    pub fn train(&mut self, recorder: &mut dyn AggregateRecorder) -> Result<RunSummary> {
        self.run(recorder, None)
    }

    /// Resumes training from a checkpoint directory, then evaluates the agent.
    pub fn resume(
        &mut self,
        recorder: &mut dyn AggregateRecorder,
        checkpoint: impl AsRef<Path>,
    ) -> Result<RunSummary> {
        self.run(recorder, Some(checkpoint.as_ref()))
    }

    fn run(
        &mut self,
        recorder: &mut dyn AggregateRecorder,
        checkpoint: Option<&Path>,
    ) -> Result<RunSummary> {
        let mut evaluator = DiscoveryEvaluator::new(
            &self.config.env_config,
            self.config.eval_seed(),
            self.config.n_eval_episodes,
        )?;
        let training = match checkpoint {
            Some(dir) => self
                .trainer
                .resume(&mut self.agent, recorder, &mut evaluator, dir)?,
            None => self.trainer.train(&mut self.agent, recorder, &mut evaluator)?,
        };

        self.agent.eval();
        let eval = evaluator.evaluate_stats(&mut self.agent)?;
        let step = training.episodes;
        for (name, value) in [
            ("final/mean_final_error", eval.mean_final_error),
            ("final/mean_symbolic_cost", eval.mean_symbolic_cost),
            ("final/success_rate", eval.success_rate),
            ("final/mean_return", eval.mean_return),
        ] {
            recorder.record(name, value, step);
        }
        info!(
            "Final evaluation: success rate {}, mean error {}",
            eval.success_rate, eval.mean_final_error
        );

        Ok(RunSummary {
            critic_mode: self.config.critic_mode,
            training,
            eval,
        })
    }
}

/// Trains an agent on the environment `env_id` for `n_episodes` episodes.
///
/// `env_id` is `matmul-<n>x<n>`, optionally followed by `-outer`, `-scalar` or
/// `-strassen`. Metrics are written to `recorder`.
pub fn run(
    mode: CriticMode,
    env_id: &str,
    n_episodes: usize,
    recorder: &mut dyn AggregateRecorder,
) -> Result<RunSummary> {
    let config = ExperimentConfig::new(mode, env_id)?.n_episodes(n_episodes);
    Experiment::build(config)?.train(recorder)
}
