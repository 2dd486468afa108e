//! Evaluation of policies on [`DiscoveryEnv`].
use crate::{DiscoveryEnv, DiscoveryEnvConfig};
use alphamat_core::{
    error::{as_alphamat_error, AlphamatError},
    record::{Record, RecordValue::Scalar},
    Env, Evaluator, Policy,
};
use anyhow::{bail, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Statistics of evaluation episodes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct EvalStats {
    /// Mean of `‖C - AB‖_F` at the end of episodes.
    pub mean_final_error: f32,

    /// Mean symbolic cost of episodes.
    pub mean_symbolic_cost: f32,

    /// Fraction of episodes that converged.
    pub success_rate: f32,

    /// Mean of the sum of rewards of episodes.
    pub mean_return: f32,

    /// The number of episodes.
    pub n_episodes: usize,

    /// The number of episodes that diverged.
    pub n_diverged: usize,
}

impl EvalStats {
    /// Converts the statistics into a [`Record`] with keys prefixed by `eval/`.
    pub fn to_record(&self) -> Record {
        Record::from_slice(&[
            ("eval/mean_final_error", Scalar(self.mean_final_error)),
            ("eval/mean_symbolic_cost", Scalar(self.mean_symbolic_cost)),
            ("eval/success_rate", Scalar(self.success_rate)),
            ("eval/mean_return", Scalar(self.mean_return)),
            ("eval/n_diverged", Scalar(self.n_diverged as f32)),
        ])
    }
}

/// Runs non-exploring episodes of [`DiscoveryEnv`].
///
/// Episode `ix` of every evaluation uses the same matrices, drawn with
/// [`Env::reset_with_index`]`(ix)` from the seed of the evaluator.
pub struct DiscoveryEvaluator {
    env: DiscoveryEnv,
    n_episodes: usize,
}

impl DiscoveryEvaluator {
    /// Constructs an evaluator.
    pub fn new(config: &DiscoveryEnvConfig, seed: i64, n_episodes: usize) -> Result<Self> {
        if n_episodes == 0 {
            bail!(AlphamatError::Config("evaluation needs at least one episode".into()));
        }
        Ok(Self {
            env: DiscoveryEnv::build(config, seed)?,
            n_episodes,
        })
    }

    /// Runs the evaluation episodes with the given policy.
    ///
    /// The caller is responsible for putting the policy in non-exploring mode.
    /// A diverged episode counts as unsuccessful. When it diverges in a step,
    /// the error of its last finite state enters the means. When the product of
    /// its matrices is not finite, it ends before the first step and is left
    /// out of the means of error, cost and return. If no episode starts, the
    /// mean error is infinite and the mean return is negative infinity.
    pub fn evaluate_stats<P: Policy<DiscoveryEnv>>(&mut self, policy: &mut P) -> Result<EvalStats> {
        let mut stats = EvalStats {
            n_episodes: self.n_episodes,
            ..Default::default()
        };
        let mut n_started = 0;

        for ix in 0..self.n_episodes {
            let mut obs = match self.env.reset_with_index(ix) {
                Ok(obs) => obs,
                Err(err) => match as_alphamat_error(&err) {
                    Some(AlphamatError::NumericDivergence(msg)) => {
                        warn!("Evaluation episode {} diverged at reset: {}", ix, msg);
                        stats.n_diverged += 1;
                        continue;
                    }
                    _ => return Err(err),
                },
            };
            n_started += 1;
            let mut episode_return = 0.0;
            let converged = loop {
                let act = policy.sample(&obs)?;
                match self.env.step(&act) {
                    Ok((step, _)) => {
                        episode_return += step.reward;
                        if step.is_done() {
                            break step.info.converged;
                        }
                        obs = step.obs;
                    }
                    Err(err) => match as_alphamat_error(&err) {
                        Some(AlphamatError::NumericDivergence(msg)) => {
                            warn!("Evaluation episode {} diverged: {}", ix, msg);
                            stats.n_diverged += 1;
                            break false;
                        }
                        _ => return Err(err),
                    },
                }
            };
            stats.mean_final_error += self.env.error_norm();
            stats.mean_symbolic_cost += self.env.cumulative_cost();
            stats.success_rate += converged as i32 as f32;
            stats.mean_return += episode_return;
        }

        stats.success_rate /= self.n_episodes as f32;
        if n_started > 0 {
            let n = n_started as f32;
            stats.mean_final_error /= n;
            stats.mean_symbolic_cost /= n;
            stats.mean_return /= n;
        } else {
            stats.mean_final_error = f32::INFINITY;
            stats.mean_return = f32::NEG_INFINITY;
        }
        info!(
            "Evaluation: mean return {}, mean final error {}, success rate {}, {} diverged",
            stats.mean_return, stats.mean_final_error, stats.success_rate, stats.n_diverged
        );
        Ok(stats)
    }
}

impl<P: Policy<DiscoveryEnv>> Evaluator<DiscoveryEnv, P> for DiscoveryEvaluator {
    /// Scores the policy by the mean return.
    fn evaluate(&mut self, policy: &mut P) -> Result<(f32, Record)> {
        let stats = self.evaluate_stats(policy)?;
        Ok((stats.mean_return, stats.to_record()))
    }
}
