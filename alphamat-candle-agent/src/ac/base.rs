use super::ActorCriticConfig;
use crate::{
    actor::Actor,
    critic::Critic,
    ent_coef::EntCoef,
    util::{gamma_not_done, masked_features, reward},
};
use alphamat_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, MaskedFeatures, Policy, ReplayBufferBase, TransitionBatch,
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use log::trace;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    marker::PhantomData,
    path::Path,
};

const AGENT_STATE_FILE: &str = "agent_state.bin";

/// Counters restoring the sampling sequence of the agent.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct AgentState {
    n_samples: u64,
    n_opts: usize,
}

/// Off-policy actor-critic agent over a finite action set.
///
/// In an optimization step, the agent samples a minibatch and
/// 1. regresses the critic on `y = r + γ (1 - done) Q_tgt(s', argmax π_tgt(s'))`,
/// 2. updates the actor on `E_s[Σ_a π(a|s) (α log π(a|s) - Q(s, a))]` with `Q` detached,
/// 3. moves both target networks with `θ_t ← τθ + (1 - τ)θ_t`.
///
/// The critic is classical or quantum depending on its configuration; the
/// update is the same in both cases.
pub struct ActorCritic<E, R> {
    actor: Actor,
    critic: Critic,
    ent_coef: EntCoef,
    gamma: f64,
    tau: f64,
    batch_size: usize,
    n_updates_per_opt: usize,
    train: bool,
    seed: u64,
    state: AgentState,
    device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, R> ActorCritic<E, R>
where
    E: Env,
    E::Obs: MaskedFeatures,
    E::Act: From<usize>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: MaskedFeatures,
    <R::Batch as TransitionBatch>::ActBatch: AsRef<[u32]>,
{
    /// Returns the actor.
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Returns the critic.
    pub fn critic(&self) -> &Critic {
        &self.critic
    }

    /// Returns the number of updates applied so far.
    pub fn n_opts(&self) -> usize {
        self.state.n_opts
    }

    /// The random number generator of the next action.
    fn next_rng(&mut self) -> StdRng {
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.state.n_samples));
        self.state.n_samples += 1;
        rng
    }

    fn update_critic(&mut self, batch: &R::Batch, obs: &Tensor) -> Result<f32> {
        let (next_obs, next_mask) = masked_features(batch.next_obs(), &self.device)?;
        let act = batch.act().as_ref();

        let tgt = {
            let next_act = self.actor.greedy_tgt(&next_obs, &next_mask)?;
            let next_q = self.critic.q_value_tgt(&next_obs, &next_act)?;
            let r = reward(batch.reward(), &self.device)?;
            let discount = gamma_not_done(
                self.gamma as f32,
                batch.is_terminated(),
                batch.is_truncated(),
                &self.device,
            )?;
            (r + (discount * next_q)?)?.detach()
        };

        self.critic.update(obs, act, &tgt)
    }

    /// `q` holds the action values of all actions at the observations of the batch.
    fn update_actor(&mut self, obs: &Tensor, mask: &Tensor, q: &Tensor) -> Result<f32> {
        let log_p = self.actor.log_probs(obs, mask)?;
        let p = log_p.exp()?;
        let alpha = self.ent_coef.alpha()?;

        let loss = (&p * (log_p.broadcast_mul(&alpha)? - q)?)?
            .sum(1)?
            .mean(0)?;
        self.actor.backward_step(&loss)?;

        let neg_entropy = (p * log_p)?.sum(1)?.detach();
        self.ent_coef.update(&neg_entropy)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn soft_update(&mut self) -> Result<()> {
        self.critic.soft_update(self.tau)?;
        self.actor.soft_update(self.tau)
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;

        for _ in 0..self.n_updates_per_opt {
            let batch = buffer.batch(self.batch_size)?;

            // Every critic evaluation precedes the first parameter step of the update.
            // The actor is trained against the critic before its step.
            let (obs, mask) = masked_features(batch.obs(), &self.device)?;
            let q = self.critic.q_values_all(&obs)?.detach();

            trace!("update_critic()");
            loss_critic += self.update_critic(&batch, &obs)?;

            trace!("update_actor()");
            loss_actor += self.update_actor(&obs, &mask, &q)?;

            trace!("soft_update()");
            self.soft_update()?;

            self.state.n_opts += 1;
        }

        loss_critic /= self.n_updates_per_opt as f32;
        loss_actor /= self.n_updates_per_opt as f32;

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            ("ent_coef", RecordValue::Scalar(self.ent_coef.alpha_scalar()?)),
        ]))
    }
}

impl<E, R> Policy<E> for ActorCritic<E, R>
where
    E: Env,
    E::Obs: MaskedFeatures,
    E::Act: From<usize>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: MaskedFeatures,
    <R::Batch as TransitionBatch>::ActBatch: AsRef<[u32]>,
{
    /// Samples from the policy in training mode and takes the most probable legal
    /// action in evaluation mode.
    fn sample(&mut self, obs: &E::Obs) -> Result<E::Act> {
        let (features, mask) = masked_features(obs, &self.device)?;
        let mut rng = self.next_rng();
        let a = self.actor.act(&features, &mask, self.train, &mut rng)?;
        Ok(a.into())
    }
}

impl<E, R> Configurable<E> for ActorCritic<E, R>
where
    E: Env,
    E::Obs: MaskedFeatures,
    E::Act: From<usize>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: MaskedFeatures,
    <R::Batch as TransitionBatch>::ActBatch: AsRef<[u32]>,
{
    type Config = ActorCriticConfig;

    /// Constructs [`ActorCritic`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        config.validate()?;
        let device: Device = config.device.try_into()?;
        let actor = Actor::build(config.actor_config, device.clone())?;
        let critic = Critic::build(config.critic_config, actor.n_actions(), device.clone())?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, device.clone())?;

        Ok(Self {
            actor,
            critic,
            ent_coef,
            gamma: config.gamma,
            tau: config.tau,
            batch_size: config.batch_size,
            n_updates_per_opt: config.n_updates_per_opt,
            train: false,
            seed: config.seed,
            state: AgentState::default(),
            device,
            phantom: PhantomData,
        })
    }
}

impl<E, R> Agent<E, R> for ActorCritic<E, R>
where
    E: Env,
    E::Obs: MaskedFeatures,
    E::Act: From<usize>,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: MaskedFeatures,
    <R::Batch as TransitionBatch>::ActBatch: AsRef<[u32]>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        self.opt_(buffer)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.actor.save(path)?;
        self.critic.save(path)?;
        self.ent_coef.save(path)?;
        let file = File::create(path.join(AGENT_STATE_FILE))?;
        bincode::serialize_into(BufWriter::new(file), &self.state)?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.actor.load(path)?;
        self.critic.load(path)?;
        self.ent_coef.load(path)?;
        let file = File::open(path.join(AGENT_STATE_FILE))?;
        self.state = bincode::deserialize_from(BufReader::new(file))?;
        Ok(())
    }
}
