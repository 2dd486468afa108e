//! Interaction of an agent with the training environment.
use crate::{
    error::{as_alphamat_error, AlphamatError},
    record::{Record, RecordValue::Scalar},
    Agent, Env, ExperienceBufferBase, ReplayBufferBase, Step, StepProcessor,
};
use anyhow::{anyhow, Result};

/// Runs episodes of the training environment and pushes transitions into a replay buffer.
///
/// It keeps the previous observation, the return and the length of the running
/// episode.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
    episode_return: f32,
    episode_length: usize,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a new sampler with the given environment and step processor.
    pub fn new(env: E, step_processor: P) -> Self {
        Self {
            env,
            prev_obs: None,
            step_processor,
            episode_return: 0.0,
            episode_length: 0,
        }
    }

    /// Starts episode `ix` with [`Env::reset_with_index`].
    ///
    /// The counters of the episode are cleared even if the reset fails.
    pub fn reset_episode(&mut self, ix: usize) -> Result<()> {
        self.prev_obs = None;
        self.episode_return = 0.0;
        self.episode_length = 0;
        let obs = self.env.reset_with_index(ix)?;
        self.step_processor.reset(obs.clone());
        self.prev_obs = Some(obs);
        Ok(())
    }

    /// Return and length of the running episode.
    pub fn episode_record(&self) -> Record {
        Record::from_slice(&[
            ("episode_return", Scalar(self.episode_return)),
            ("episode_length", Scalar(self.episode_length as f32)),
        ])
    }

    /// Samples an action, applies it to the environment and pushes the transition.
    ///
    /// Returns `Some(record)` when the step ended the episode, where `record` holds the
    /// last record of the environment and [`Sampler::episode_record`].
    ///
    /// If the environment fails with [`AlphamatError::NumericDivergence`], a terminal
    /// transition back to the previous observation with reward `divergence_penalty`
    /// is pushed, the episode ends and the error is returned.
    pub fn sample_and_push<A, R>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        divergence_penalty: f32,
    ) -> Result<Option<Record>>
    where
        A: Agent<E, R>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        let prev_obs = self
            .prev_obs
            .take()
            .ok_or_else(|| anyhow!("Sampler is not reset. Call reset_episode() first"))?;
        let act = agent.sample(&prev_obs)?;

        let (step, record) = match self.env.step(&act) {
            Ok(v) => v,
            Err(err) => {
                if let Some(AlphamatError::NumericDivergence(_)) = as_alphamat_error(&err) {
                    let step = Step::new(
                        prev_obs,
                        act,
                        divergence_penalty,
                        true,
                        false,
                        E::Info::default(),
                    );
                    self.episode_return += divergence_penalty;
                    self.episode_length += 1;
                    buffer.push(self.step_processor.process(step)?)?;
                }
                return Err(err);
            }
        };

        self.episode_return += step.reward;
        self.episode_length += 1;
        let is_done = step.is_done();
        if !is_done {
            self.prev_obs = Some(step.obs.clone());
        }
        buffer.push(self.step_processor.process(step)?)?;

        match is_done {
            true => Ok(Some(record.merge(self.episode_record()))),
            false => Ok(None),
        }
    }
}
