//! Train [`Agent`].
mod checkpoint;
mod config;
mod sampler;
mod stop;
use crate::{
    error::as_alphamat_error,
    record::{
        AggregateRecorder, Record,
        RecordValue::{DateTime, Scalar},
    },
    Agent, Env, Evaluator, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::{Context, Result};
use chrono::Local;
pub use checkpoint::{
    checkpoint_dir, TrainerState, AGENT_DIR, REPLAY_BUFFER_FILE, TRAINER_STATE_FILE,
};
pub use config::TrainerConfig;
use log::{info, trace, warn};
pub use sampler::Sampler;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
pub use stop::StopSignal;

/// Outcome of [`Trainer::train`].
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TrainingSummary {
    /// Completed episodes, including those of a resumed checkpoint.
    pub episodes: usize,

    /// Environment steps.
    pub env_steps: usize,

    /// Optimization steps.
    pub opt_steps: usize,

    /// Counts of recovered errors, keyed by their kind.
    pub recoverable: BTreeMap<String, usize>,

    /// The best evaluation score, if the agent was evaluated.
    pub best_eval_score: Option<f32>,

    /// `true` if the run ended because of the [`StopSignal`].
    pub stopped: bool,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages training loop and related objects.
///
/// # Training loop
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Init
///     Init --> EpisodeReset
///     EpisodeReset --> Step
///     Step --> Step: not done
///     Step --> EpisodeEnd: done or diverged
///     EpisodeEnd --> EpisodeReset: budget left
///     EpisodeEnd --> [*]: budget exhausted or stop signal
/// ```
///
/// 1. Init: validate the configuration, build [`Env`], [`StepProcessor`] and the
///    replay buffer. When resuming, restore agent, buffer and [`TrainerState`]
///    from a checkpoint.
/// 2. Episode reset: if the [`StopSignal`] is raised, finish. Otherwise reset the
///    environment with [`Env::reset_with_index`]`(episodes)`.
/// 3. Step: the agent samples an action, the transition is pushed into the replay
///    buffer and `env_steps += 1`. If the buffer holds at least `warmup_period`
///    transitions and `env_steps % opt_interval == 0`, do an optimization step
///    with [`Agent::opt_with_record`]. Records of optimization steps are stored in
///    the recorder.
/// 4. Episode end: `episodes += 1` and the episode record is stored. Then
///     * evaluate the agent every `eval_interval` episodes, saving the best one in
///       `(model_dir)/best`,
///     * save a checkpoint every `save_interval` episodes in `(model_dir)/(episodes)`,
///     * flush the recorder every `flush_record_interval` episodes.
///
///    Training finishes when `episodes == max_episodes` or `env_steps` reached
///    `max_env_steps`.
///
/// # Errors
///
/// Errors for which [`AlphamatError::is_recoverable`] holds do not stop training:
/// a numeric divergence of the environment in a step ends the episode with a
/// penalized terminal transition, a divergence at reset ends the episode before
/// its first step, and a failed optimization step is skipped. Each is counted,
/// logged with `warn!` and written to the recorder as `recoverable/(kind)`.
/// Any other error stops training and is returned.
///
/// [`AlphamatError::is_recoverable`]: crate::error::AlphamatError::is_recoverable
pub struct Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    config: TrainerConfig,
    env_config_train: E::Config,
    step_proc_config: P::Config,
    replay_buffer_config: R::Config,
    stop_signal: StopSignal,
}

impl<E, P, R> Trainer<E, P, R>
where
    E: Env,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    /// Constructs a trainer.
    ///
    /// Fails if the configuration is invalid.
    pub fn build(
        config: TrainerConfig,
        env_config_train: E::Config,
        step_proc_config: P::Config,
        replay_buffer_config: R::Config,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            env_config_train,
            step_proc_config,
            replay_buffer_config,
            stop_signal: StopSignal::new(),
        })
    }

    /// Returns a handle of the stop signal of this trainer.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Trains the agent from scratch.
    pub fn train<A, D>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut D,
    ) -> Result<TrainingSummary>
    where
        A: Agent<E, R>,
        D: Evaluator<E, A>,
    {
        self.run(agent, recorder, evaluator, None)
    }

    /// Resumes training from a checkpoint directory written by this trainer.
    pub fn resume<A, D>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut D,
        checkpoint: impl AsRef<Path>,
    ) -> Result<TrainingSummary>
    where
        A: Agent<E, R>,
        D: Evaluator<E, A>,
    {
        self.run(agent, recorder, evaluator, Some(checkpoint.as_ref()))
    }

    fn model_dir(&self) -> Option<PathBuf> {
        self.config.model_dir.as_ref().map(PathBuf::from)
    }

    /// Saves agent, replay buffer and counters in `dir`.
    fn save_checkpoint<A: Agent<E, R>>(
        agent: &A,
        buffer: &R,
        state: &TrainerState,
        dir: &Path,
    ) -> Result<()> {
        fs::create_dir_all(dir)?;
        agent.save_params(&dir.join(AGENT_DIR))?;
        buffer.save(&dir.join(REPLAY_BUFFER_FILE))?;
        state.save(dir)?;
        info!("Saved checkpoint in {:?}", dir);
        Ok(())
    }

    fn load_checkpoint<A: Agent<E, R>>(
        agent: &mut A,
        buffer: &mut R,
        dir: &Path,
    ) -> Result<TrainerState> {
        agent
            .load_params(&dir.join(AGENT_DIR))
            .with_context(|| format!("Failed to load agent from {:?}", dir))?;
        buffer.load(&dir.join(REPLAY_BUFFER_FILE))?;
        let state = TrainerState::load(dir)?;
        info!(
            "Resumed from {:?} after {} episodes, {} env steps",
            dir, state.episodes, state.env_steps
        );
        Ok(state)
    }

    /// Counts, logs and records an error if it is recoverable, otherwise returns it.
    fn recover(
        err: anyhow::Error,
        state: &mut TrainerState,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()> {
        match as_alphamat_error(&err) {
            Some(e) if e.is_recoverable() => {
                let n = state.count_recoverable(e.kind());
                warn!("Recovered from error after {} env steps: {}", state.env_steps, e);
                recorder.record(&format!("recoverable/{}", e.kind()), n as f32, state.env_steps);
                Ok(())
            }
            _ => Err(err),
        }
    }

    fn is_budget_exhausted(&self, state: &TrainerState) -> bool {
        state.episodes >= self.config.max_episodes
            || self
                .config
                .max_env_steps
                .map_or(false, |max| state.env_steps >= max)
    }

    /// Performs environment steps until the episode ends.
    fn run_episode<A: Agent<E, R>>(
        &self,
        agent: &mut A,
        buffer: &mut R,
        sampler: &mut Sampler<E, P>,
        state: &mut TrainerState,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<Record> {
        if let Err(err) = sampler.reset_episode(state.episodes) {
            Self::recover(err, state, recorder)?;
            let mut record = sampler.episode_record();
            record.insert("diverged", Scalar(1.0));
            return Ok(record);
        }

        loop {
            let res = sampler.sample_and_push(agent, buffer, self.config.divergence_penalty);
            state.env_steps += 1;
            let episode_record = match res {
                Ok(r) => r,
                Err(err) => {
                    Self::recover(err, state, recorder)?;
                    let mut record = sampler.episode_record();
                    record.insert("diverged", Scalar(1.0));
                    Some(record)
                }
            };

            if buffer.len() >= self.config.warmup_period
                && state.env_steps % self.config.opt_interval == 0
            {
                trace!("Optimization step at {} env steps", state.env_steps);
                match agent.opt_with_record(buffer) {
                    Ok(record) => {
                        state.opt_steps += 1;
                        if !record.is_empty() {
                            recorder.store(record);
                        }
                    }
                    Err(err) => Self::recover(err, state, recorder)?,
                }
            }

            if let Some(record) = episode_record {
                return Ok(record);
            }
        }
    }

    fn run<A, D>(
        &mut self,
        agent: &mut A,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut D,
        checkpoint: Option<&Path>,
    ) -> Result<TrainingSummary>
    where
        A: Agent<E, R>,
        D: Evaluator<E, A>,
    {
        let env = E::build(&self.env_config_train, self.config.seed)?;
        let producer = P::build(&self.step_proc_config);
        let mut buffer = R::build(&self.replay_buffer_config)?;
        let mut sampler = Sampler::new(env, producer);
        let mut state = match checkpoint {
            Some(dir) => Self::load_checkpoint(agent, &mut buffer, dir)?,
            None => TrainerState::default(),
        };
        let mut stopped = false;
        agent.train();

        while !self.is_budget_exhausted(&state) {
            if self.stop_signal.is_stopped() {
                info!("Stop signal raised after {} episodes", state.episodes);
                stopped = true;
                break;
            }

            let mut record =
                self.run_episode(agent, &mut buffer, &mut sampler, &mut state, recorder)?;
            state.episodes += 1;
            let episodes = state.episodes;

            // Evaluation
            if self.config.eval_interval > 0 && episodes % self.config.eval_interval == 0 {
                info!("Starts evaluation of the trained model");
                agent.eval();
                let (score, eval_record) = evaluator.evaluate(agent)?;
                agent.train();
                record.merge_inplace(eval_record);

                // Save the best model up to the current episode
                if state.best_eval_score.map_or(true, |best| score > best) {
                    state.best_eval_score = Some(score);
                    if let Some(model_dir) = self.model_dir() {
                        let dir = model_dir.join("best");
                        agent.save_params(&dir)?;
                        info!("Saved the best model (score {}) in {:?}", score, dir);
                    }
                }
            }

            record.insert("episode", Scalar(episodes as f32));
            record.insert("datetime", DateTime(Local::now()));
            recorder.store(record);

            // Save a checkpoint
            if self.config.save_interval > 0 && episodes % self.config.save_interval == 0 {
                if let Some(model_dir) = self.model_dir() {
                    let dir = checkpoint_dir(model_dir, episodes);
                    Self::save_checkpoint(agent, &buffer, &state, &dir)?;
                }
            }

            // Flush records
            if self.config.flush_record_interval > 0
                && episodes % self.config.flush_record_interval == 0
            {
                recorder.flush(episodes as _);
            }
        }

        if self.config.flush_record_interval > 0
            && state.episodes % self.config.flush_record_interval != 0
        {
            recorder.flush(state.episodes as _);
        }

        info!(
            "Training finished: {} episodes, {} env steps, {} optimization steps",
            state.episodes, state.env_steps, state.opt_steps
        );

        Ok(TrainingSummary {
            episodes: state.episodes,
            env_steps: state.env_steps,
            opt_steps: state.opt_steps,
            recoverable: state.recoverable,
            best_eval_score: state.best_eval_score,
            stopped,
        })
    }
}
