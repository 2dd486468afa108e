//! Configuration of [`SimpleReplayBuffer`](super::SimpleReplayBuffer).
use crate::error::AlphamatError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`SimpleReplayBuffer`](super::SimpleReplayBuffer).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SimpleReplayBufferConfig {
    /// The maximum number of transitions held by the buffer.
    pub capacity: usize,

    /// Random seed for sampling minibatches.
    pub seed: u64,
}

impl Default for SimpleReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            seed: 42,
        }
    }
}

impl SimpleReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed for sampling minibatches.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(AlphamatError::Config("capacity of replay buffer must be positive".into()).into());
        }
        Ok(())
    }

    /// Constructs [`SimpleReplayBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SimpleReplayBufferConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = SimpleReplayBufferConfig::default().capacity(100).seed(7);
        let dir = TempDir::new("replay_buffer_config")?;
        let path = dir.path().join("replay_buffer.yaml");
        config.save(&path)?;
        assert_eq!(config, SimpleReplayBufferConfig::load(&path)?);
        Ok(())
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = SimpleReplayBufferConfig::default().capacity(0).validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<AlphamatError>().map(|e| e.kind()),
            Some("config")
        );
    }
}
