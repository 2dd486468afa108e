use super::Evaluator;
use crate::{error::AlphamatError, record::Record, Env, Policy};
use anyhow::Result;

/// Runs a fixed number of episodes and scores a policy by the average return.
///
/// Episode `ix` starts from [`Env::reset_with_index`]`(ix)`, so every evaluation
/// sees the same initial states.
pub struct DefaultEvaluator<E: Env> {
    n_episodes: usize,
    env: E,
}

impl<E: Env, P: Policy<E>> Evaluator<E, P> for DefaultEvaluator<E> {
    fn evaluate(&mut self, policy: &mut P) -> Result<(f32, Record)> {
        let mut r_total = 0f32;

        for ix in 0..self.n_episodes {
            let mut prev_obs = self.env.reset_with_index(ix)?;

            loop {
                let act = policy.sample(&prev_obs)?;
                let (step, _) = self.env.step(&act)?;
                r_total += step.reward;
                if step.is_done() {
                    break;
                }
                prev_obs = step.obs;
            }
        }

        let mean_return = r_total / self.n_episodes as f32;
        Ok((mean_return, Record::from_scalar("eval/episode_return", mean_return)))
    }
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`].
    pub fn new(config: &E::Config, seed: i64, n_episodes: usize) -> Result<Self> {
        if n_episodes == 0 {
            return Err(AlphamatError::Config("evaluation needs at least one episode".into()).into());
        }
        Ok(Self {
            n_episodes,
            env: E::build(config, seed)?,
        })
    }
}
