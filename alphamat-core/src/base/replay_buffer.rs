//! Replay buffer interface.
use anyhow::Result;
use std::path::Path;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no experience.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Samples a batch of `size` experiences.
    ///
    /// Fails with [`AlphamatError::InsufficientData`] when fewer than `size`
    /// experiences are stored.
    ///
    /// [`AlphamatError::InsufficientData`]: crate::error::AlphamatError::InsufficientData
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Saves the contents and the sampling state of the buffer.
    fn save(&self, path: &Path) -> Result<()>;

    /// Restores the buffer saved with [`ReplayBufferBase::save`].
    fn load(&mut self, path: &Path) -> Result<()>;
}
