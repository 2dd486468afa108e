//! A one-dimensional walk used to exercise the buffer and the trainer.
#![allow(dead_code)]
use alphamat_core::{
    error::AlphamatError,
    record::Record,
    replay_buffer::{
        BatchBase, GenericTransitionBatch, SimpleReplayBuffer, SimpleStepProcessor,
    },
    Act, Agent, Env, Obs, Policy, ReplayBufferBase, Step,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Clone, Debug)]
pub struct WalkObs(pub f32);

impl Obs for WalkObs {}

/// `0` moves right, `1` moves left, `2` makes the state non-finite.
#[derive(Clone, Debug)]
pub struct WalkAct(pub usize);

impl Act for WalkAct {}

#[derive(Clone, Debug)]
pub struct WalkConfig {
    pub target: i32,
    pub max_steps: usize,
    /// Episodes whose reset fails with a numeric divergence.
    pub diverging_episodes: Vec<usize>,
}

pub struct Walk {
    config: WalkConfig,
    pos: i32,
    t: usize,
}

impl Env for Walk {
    type Config = WalkConfig;
    type Obs = WalkObs;
    type Act = WalkAct;
    type Info = ();

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            pos: 0,
            t: 0,
        })
    }

    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        let pos = match a.0 {
            0 => self.pos + 1,
            1 => self.pos - 1,
            2 => return Err(AlphamatError::NumericDivergence("walked to infinity".into()).into()),
            index => {
                return Err(AlphamatError::InvalidAction {
                    index,
                    reason: "out of range".into(),
                }
                .into())
            }
        };
        self.pos = pos;
        self.t += 1;
        let dist = (self.config.target - pos).abs() as f32;
        let is_terminated = dist == 0.0;
        let is_truncated = !is_terminated && self.t >= self.config.max_steps;
        let step = Step::new(WalkObs(pos as f32), a.clone(), -dist, is_terminated, is_truncated, ());
        Ok((step, Record::from_scalar("distance", dist)))
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        self.pos = 0;
        self.t = 0;
        Ok(WalkObs(0.0))
    }

    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        if self.config.diverging_episodes.contains(&ix) {
            return Err(AlphamatError::NumericDivergence(format!("episode {} starts at infinity", ix)).into());
        }
        self.reset()
    }
}

/// A column of scalars.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Col(pub Vec<f32>);

impl BatchBase for Col {
    fn new(capacity: usize) -> Self {
        Col(vec![0.0; capacity])
    }

    fn push(&mut self, ix: usize, data: Self) -> Result<()> {
        let capacity = self.0.len();
        for (k, v) in data.0.into_iter().enumerate() {
            self.0[(ix + k) % capacity] = v;
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Self {
        Col(ixs.iter().map(|&ix| self.0[ix]).collect())
    }
}

impl From<WalkObs> for Col {
    fn from(obs: WalkObs) -> Self {
        Col(vec![obs.0])
    }
}

impl From<WalkAct> for Col {
    fn from(act: WalkAct) -> Self {
        Col(vec![act.0 as f32])
    }
}

pub type Buffer = SimpleReplayBuffer<Col, Col>;
pub type StepProc = SimpleStepProcessor<Walk, Col, Col>;

/// A transition with the given reward.
pub fn transition(reward: f32) -> GenericTransitionBatch<Col, Col> {
    GenericTransitionBatch {
        obs: Col(vec![reward]),
        act: Col(vec![0.0]),
        next_obs: Col(vec![reward + 1.0]),
        reward: vec![reward],
        is_terminated: vec![0],
        is_truncated: vec![0],
    }
}

/// Cycles through a fixed sequence of actions and counts optimization steps.
#[derive(Serialize, Deserialize)]
pub struct ScriptedAgent {
    pub actions: Vec<usize>,
    pub cursor: usize,
    pub batch_size: usize,
    pub n_opts: usize,
    /// Every optimization step fails with a circuit evaluation error.
    pub failing_circuit: bool,
    #[serde(skip)]
    pub training: bool,
}

impl ScriptedAgent {
    pub fn new(actions: Vec<usize>, batch_size: usize) -> Self {
        Self {
            actions,
            cursor: 0,
            batch_size,
            n_opts: 0,
            failing_circuit: false,
            training: false,
        }
    }
}

impl Policy<Walk> for ScriptedAgent {
    fn sample(&mut self, _obs: &WalkObs) -> Result<WalkAct> {
        let a = self.actions[self.cursor % self.actions.len()];
        self.cursor += 1;
        Ok(WalkAct(a))
    }
}

impl Agent<Walk, Buffer> for ScriptedAgent {
    fn train(&mut self) {
        self.training = true;
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn is_train(&self) -> bool {
        self.training
    }

    fn opt_with_record(&mut self, buffer: &mut Buffer) -> Result<Record> {
        if self.failing_circuit {
            return Err(AlphamatError::CircuitEvaluation("angle out of range".into()).into());
        }
        let batch = buffer.batch(self.batch_size)?;
        self.n_opts += 1;
        let mean = batch.reward.iter().sum::<f32>() / batch.reward.len() as f32;
        Ok(Record::from_scalar("mean_reward", mean))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        fs::write(path.join("agent.yaml"), serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        let agent: Self = serde_yaml::from_str(&fs::read_to_string(path.join("agent.yaml"))?)?;
        self.cursor = agent.cursor;
        self.n_opts = agent.n_opts;
        Ok(())
    }
}
