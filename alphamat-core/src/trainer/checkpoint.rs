//! Counters of a training run and their persistence.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// File of [`TrainerState`] in a checkpoint directory.
pub const TRAINER_STATE_FILE: &str = "trainer_state.yaml";

/// File of the replay buffer in a checkpoint directory.
pub const REPLAY_BUFFER_FILE: &str = "replay_buffer.bin";

/// Subdirectory of the agent parameters in a checkpoint directory.
pub const AGENT_DIR: &str = "agent";

/// Counters of a training run.
///
/// The state is written to every checkpoint, so that a resumed run continues
/// the episode sequence where it stopped.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainerState {
    /// Completed episodes.
    pub episodes: usize,

    /// Environment steps.
    pub env_steps: usize,

    /// Optimization steps.
    pub opt_steps: usize,

    /// Counts of recovered errors, keyed by [`AlphamatError::kind`].
    ///
    /// [`AlphamatError::kind`]: crate::error::AlphamatError::kind
    pub recoverable: BTreeMap<String, usize>,

    /// The best evaluation score so far.
    pub best_eval_score: Option<f32>,
}

impl TrainerState {
    /// Loads the state from a checkpoint directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(dir.as_ref().join(TRAINER_STATE_FILE))?;
        let rdr = BufReader::new(file);
        Ok(serde_yaml::from_reader(rdr)?)
    }

    /// Saves the state in a checkpoint directory.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(dir.as_ref().join(TRAINER_STATE_FILE))?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    /// Increments the counter of the given error kind and returns the new count.
    pub fn count_recoverable(&mut self, kind: &str) -> usize {
        let n = self.recoverable.entry(kind.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

/// Directory of the checkpoint saved after the given episode.
pub fn checkpoint_dir(model_dir: impl AsRef<Path>, episodes: usize) -> PathBuf {
    model_dir.as_ref().join(episodes.to_string())
}
