//! Observation and action of [`DiscoveryEnv`](crate::DiscoveryEnv), and their batches.
use alphamat_core::{
    error::AlphamatError, replay_buffer::BatchBase, Act, MaskedFeatures, Obs,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Observation of [`DiscoveryEnv`](crate::DiscoveryEnv).
///
/// The features are `A ‖ B` or `A ‖ B ‖ C`, each row-major, so that the width is
/// `2n²` or `3n²`. The mask flags the legal actions of the next step.
#[derive(Clone, Debug, PartialEq)]
pub struct MatmulObs {
    /// Flat features.
    pub features: Vec<f32>,

    /// Legality of each action.
    pub mask: Vec<f32>,
}

impl Obs for MatmulObs {}

impl MaskedFeatures for MatmulObs {
    fn features(&self) -> &[f32] {
        &self.features
    }

    fn dim(&self) -> usize {
        self.features.len()
    }

    fn action_mask(&self) -> &[f32] {
        &self.mask
    }

    fn n_actions(&self) -> usize {
        self.mask.len()
    }
}

/// Index into the action set of [`DiscoveryEnv`](crate::DiscoveryEnv).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatmulAct(pub usize);

impl Act for MatmulAct {}

impl From<usize> for MatmulAct {
    fn from(ix: usize) -> Self {
        Self(ix)
    }
}

/// Batch of [`MatmulObs`], also used as a column of the replay buffer.
///
/// The widths are fixed by the first push. Pushing observations of other widths
/// fails with [`AlphamatError::ShapeMismatch`], so a batch never mixes sizes of
/// matrices.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MatmulObsBatch {
    capacity: usize,
    dim: usize,
    n_actions: usize,
    features: Vec<f32>,
    mask: Vec<f32>,
}

impl MatmulObsBatch {
    fn row<'a>(x: &'a [f32], width: usize, i: usize) -> &'a [f32] {
        &x[i * width..(i + 1) * width]
    }

    fn allocate(&mut self, dim: usize, n_actions: usize) {
        self.dim = dim;
        self.n_actions = n_actions;
        self.features = vec![0.0; self.capacity * dim];
        self.mask = vec![0.0; self.capacity * n_actions];
    }
}

impl MaskedFeatures for MatmulObsBatch {
    fn features(&self) -> &[f32] {
        &self.features
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn action_mask(&self) -> &[f32] {
        &self.mask
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn n_rows(&self) -> usize {
        self.capacity
    }
}

impl BatchBase for MatmulObsBatch {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn push(&mut self, ix: usize, data: Self) -> Result<()> {
        if self.features.is_empty() && self.dim == 0 {
            self.allocate(data.dim, data.n_actions);
        }
        if data.dim != self.dim {
            bail!(AlphamatError::ShapeMismatch {
                expected: self.dim,
                actual: data.dim
            });
        }
        if data.n_actions != self.n_actions {
            bail!(AlphamatError::ShapeMismatch {
                expected: self.n_actions,
                actual: data.n_actions
            });
        }

        for k in 0..data.capacity {
            let j = (ix + k) % self.capacity;
            self.features[j * self.dim..(j + 1) * self.dim]
                .copy_from_slice(Self::row(&data.features, self.dim, k));
            self.mask[j * self.n_actions..(j + 1) * self.n_actions]
                .copy_from_slice(Self::row(&data.mask, self.n_actions, k));
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Self {
        Self {
            capacity: ixs.len(),
            dim: self.dim,
            n_actions: self.n_actions,
            features: ixs
                .iter()
                .flat_map(|&i| Self::row(&self.features, self.dim, i).iter().copied())
                .collect(),
            mask: ixs
                .iter()
                .flat_map(|&i| Self::row(&self.mask, self.n_actions, i).iter().copied())
                .collect(),
        }
    }
}

impl From<MatmulObs> for MatmulObsBatch {
    fn from(obs: MatmulObs) -> Self {
        Self {
            capacity: 1,
            dim: obs.features.len(),
            n_actions: obs.mask.len(),
            features: obs.features,
            mask: obs.mask,
        }
    }
}

/// Batch of [`MatmulAct`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MatmulActBatch(pub Vec<u32>);

impl BatchBase for MatmulActBatch {
    fn new(capacity: usize) -> Self {
        Self(vec![0; capacity])
    }

    fn push(&mut self, ix: usize, data: Self) -> Result<()> {
        let capacity = self.0.len();
        for (k, a) in data.0.into_iter().enumerate() {
            self.0[(ix + k) % capacity] = a;
        }
        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Self {
        Self(ixs.iter().map(|&i| self.0[i]).collect())
    }
}

impl AsRef<[u32]> for MatmulActBatch {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

impl From<MatmulAct> for MatmulActBatch {
    fn from(act: MatmulAct) -> Self {
        Self(vec![act.0 as u32])
    }
}
