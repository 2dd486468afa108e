//! A generic implementation of [`StepProcessor`].
use super::{BatchBase, GenericTransitionBatch};
use crate::{Env, Step, StepProcessor};
use anyhow::{anyhow, Result};
use std::marker::PhantomData;

/// Configuration of [`SimpleStepProcessor`].
#[derive(Clone, Debug, Default)]
pub struct SimpleStepProcessorConfig {}

/// A generic implementation of [`StepProcessor`].
///
/// It produces 1-step transitions `(o_t, a_t, o_t+1, r_t)`, keeping `o_t` from the
/// previous step.
pub struct SimpleStepProcessor<E, O, A> {
    prev_obs: Option<O>,
    phantom: PhantomData<(E, A)>,
}

impl<E, O, A> StepProcessor<E> for SimpleStepProcessor<E, O, A>
where
    E: Env,
    O: BatchBase + From<E::Obs>,
    A: BatchBase + From<E::Act>,
{
    type Config = SimpleStepProcessorConfig;
    type Output = GenericTransitionBatch<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self {
            prev_obs: None,
            phantom: PhantomData,
        }
    }

    fn reset(&mut self, init_obs: E::Obs) {
        self.prev_obs = Some(init_obs.into());
    }

    fn process(&mut self, step: Step<E>) -> Result<Self::Output> {
        let next_obs: O = step.obs.clone().into();
        let obs = self
            .prev_obs
            .replace(step.obs.into())
            .ok_or_else(|| anyhow!("prev_obs is not set. Forgot to call reset()?"))?;

        Ok(GenericTransitionBatch {
            obs,
            act: step.act.into(),
            next_obs,
            reward: vec![step.reward],
            is_terminated: vec![step.is_terminated as i8],
            is_truncated: vec![step.is_truncated as i8],
        })
    }
}
