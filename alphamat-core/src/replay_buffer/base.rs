//! Simple generic replay buffer.
use super::{GenericTransitionBatch, SimpleReplayBufferConfig};
use crate::{error::AlphamatError, ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::{Context, Result};
use log::info;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// A column of samples in a [`GenericTransitionBatch`], stored as a ring.
pub trait BatchBase {
    /// Builds a column with a capacity.
    fn new(capacity: usize) -> Self;

    /// Writes the samples in `data` from position `ix`, wrapping around the capacity.
    ///
    /// Fails with [`AlphamatError::ShapeMismatch`] if the samples have a different
    /// width from the ones already stored.
    fn push(&mut self, ix: usize, data: Self) -> Result<()>;

    /// Takes samples at the given positions.
    fn sample(&self, ixs: &[usize]) -> Self;
}

/// A simple generic replay buffer.
///
/// Transitions are stored column-wise in a ring of fixed capacity. Once full,
/// a push overwrites the oldest transition.
#[derive(Serialize, Deserialize)]
pub struct SimpleReplayBuffer<O, A> {
    capacity: usize,
    i: usize,
    size: usize,
    obs: O,
    act: A,
    next_obs: O,
    reward: Vec<f32>,
    is_terminated: Vec<i8>,
    is_truncated: Vec<i8>,
    seed: u64,
    n_batches: u64,
}

impl<O, A> SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    fn push_column<T: Copy>(capacity: usize, col: &mut [T], i: usize, data: &[T]) {
        let mut j = i;
        for v in data.iter() {
            col[j] = *v;
            j += 1;
            if j == capacity {
                j = 0;
            }
        }
    }

    fn sample_column<T: Copy>(col: &[T], ixs: &[usize]) -> Vec<T> {
        ixs.iter().map(|&ix| col[ix]).collect()
    }

    /// The random number generator of the next minibatch.
    ///
    /// Derived from the seed and the number of sampled minibatches, so that a
    /// restored buffer continues the same sequence of minibatches.
    fn next_rng(&mut self) -> StdRng {
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.n_batches));
        self.n_batches += 1;
        rng
    }

    /// Returns the capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns all stored transitions, oldest first.
    pub fn whole_transitions(&self) -> GenericTransitionBatch<O, A> {
        let start = if self.size == self.capacity { self.i } else { 0 };
        let ixs: Vec<usize> = (0..self.size)
            .map(|k| (start + k) % self.capacity)
            .collect();
        self.gather(&ixs)
    }

    fn gather(&self, ixs: &[usize]) -> GenericTransitionBatch<O, A> {
        GenericTransitionBatch {
            obs: self.obs.sample(ixs),
            act: self.act.sample(ixs),
            next_obs: self.next_obs.sample(ixs),
            reward: Self::sample_column(&self.reward, ixs),
            is_terminated: Self::sample_column(&self.is_terminated, ixs),
            is_truncated: Self::sample_column(&self.is_truncated, ixs),
        }
    }
}

impl<O, A> ExperienceBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.size
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        let len = tr.len();
        let (obs, act, next_obs, reward, is_terminated, is_truncated) = tr.unpack();
        self.obs.push(self.i, obs)?;
        self.act.push(self.i, act)?;
        self.next_obs.push(self.i, next_obs)?;
        Self::push_column(self.capacity, &mut self.reward, self.i, &reward);
        Self::push_column(self.capacity, &mut self.is_terminated, self.i, &is_terminated);
        Self::push_column(self.capacity, &mut self.is_truncated, self.i, &is_truncated);

        self.i = (self.i + len) % self.capacity;
        self.size = (self.size + len).min(self.capacity);

        Ok(())
    }
}

impl<O, A> ReplayBufferBase for SimpleReplayBuffer<O, A>
where
    O: BatchBase + Serialize + DeserializeOwned,
    A: BatchBase + Serialize + DeserializeOwned,
{
    type Config = SimpleReplayBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(config: &Self::Config) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity;

        Ok(Self {
            capacity,
            i: 0,
            size: 0,
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: vec![0.; capacity],
            is_terminated: vec![0; capacity],
            is_truncated: vec![0; capacity],
            seed: config.seed,
            n_batches: 0,
        })
    }

    /// Samples `size` distinct transitions uniformly at random.
    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        if size > self.size {
            return Err(AlphamatError::InsufficientData {
                requested: size,
                available: self.size,
            }
            .into());
        }
        let mut rng = self.next_rng();
        let ixs = index::sample(&mut rng, self.size, size).into_vec();
        Ok(self.gather(&ixs))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create replay buffer file {:?}", path))?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        info!("Saved replay buffer ({} transitions) to {:?}", self.size, path);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open replay buffer file {:?}", path))?;
        let buffer: Self = bincode::deserialize_from(BufReader::new(file))?;
        if buffer.capacity != self.capacity {
            return Err(AlphamatError::Config(format!(
                "replay buffer in {:?} has capacity {}, expected {}",
                path, buffer.capacity, self.capacity
            ))
            .into());
        }
        *self = buffer;
        info!("Loaded replay buffer ({} transitions) from {:?}", self.size, path);
        Ok(())
    }
}
