//! Symbolic actions applied to the running estimate `C`.
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Update of the running estimate `C` from the entries of `A` and `B`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum SymbolicOp {
    /// `C += sign * sum_{k in ks} A[:, k] ⊗ B[k, :]`.
    ///
    /// With all `k` this adds the full product.
    OuterProduct {
        /// Inner indices.
        ks: Vec<usize>,
        /// `1.0` or `-1.0`.
        sign: f32,
    },

    /// `C[i, j] += sign * A[i, k] * B[k, j]`.
    ScalarProduct {
        /// Row of `C`.
        i: usize,
        /// Inner index.
        k: usize,
        /// Column of `C`.
        j: usize,
        /// `1.0` or `-1.0`.
        sign: f32,
    },

    /// `C += w * (u · vec(A)) * (v · vec(B))` with row-major `vec`.
    Bilinear {
        /// Coefficients on `A`, `n²` entries.
        u: Vec<f32>,
        /// Coefficients on `B`, `n²` entries.
        v: Vec<f32>,
        /// Coefficients of the product in `C`, `n²` entries.
        w: Vec<f32>,
    },
}

/// An element of the action set: an operation and its symbolic cost.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SymbolicAction {
    /// The operation.
    pub op: SymbolicOp,

    /// Overrides the default cost of the operation.
    pub cost: Option<f32>,
}

impl SymbolicAction {
    /// An action with the default cost of `op`.
    pub fn new(op: SymbolicOp) -> Self {
        Self { op, cost: None }
    }

    /// Sets the cost of the action.
    pub fn with_cost(mut self, cost: f32) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Symbolic cost, counted in scalar multiplications unless overridden.
    pub fn cost(&self, n: usize) -> f32 {
        if let Some(cost) = self.cost {
            return cost;
        }
        match &self.op {
            SymbolicOp::OuterProduct { ks, .. } => (ks.len() * n * n) as f32,
            SymbolicOp::ScalarProduct { .. } | SymbolicOp::Bilinear { .. } => 1.0,
        }
    }

    /// Checks that the action applies to `n x n` matrices.
    pub fn validate(&self, n: usize) -> Result<()> {
        if let Some(cost) = self.cost {
            if !(cost.is_finite() && cost >= 0.0) {
                bail!(AlphamatError::Config(format!(
                    "cost must be finite and non-negative, got {}",
                    cost
                )));
            }
        }
        match &self.op {
            SymbolicOp::OuterProduct { ks, .. } => {
                if ks.is_empty() || ks.iter().any(|&k| k >= n) {
                    bail!(AlphamatError::Config(format!(
                        "outer product indices {:?} out of range for n = {}",
                        ks, n
                    )));
                }
            }
            SymbolicOp::ScalarProduct { i, k, j, .. } => {
                if *i >= n || *k >= n || *j >= n {
                    bail!(AlphamatError::Config(format!(
                        "scalar product ({}, {}, {}) out of range for n = {}",
                        i, k, j, n
                    )));
                }
            }
            SymbolicOp::Bilinear { u, v, w } => {
                if u.len() != n * n || v.len() != n * n || w.len() != n * n {
                    bail!(AlphamatError::Config(format!(
                        "bilinear coefficients need {} entries",
                        n * n
                    )));
                }
            }
        }
        Ok(())
    }

    /// Applies the operation to `c` in place.
    pub fn apply(&self, a: &Array2<f32>, b: &Array2<f32>, c: &mut Array2<f32>) {
        match &self.op {
            SymbolicOp::OuterProduct { ks, sign } => {
                for &k in ks {
                    let col = a.column(k);
                    let row = b.row(k);
                    for ((i, j), c_ij) in c.indexed_iter_mut() {
                        *c_ij += sign * col[i] * row[j];
                    }
                }
            }
            SymbolicOp::ScalarProduct { i, k, j, sign } => {
                c[[*i, *j]] += sign * a[[*i, *k]] * b[[*k, *j]];
            }
            SymbolicOp::Bilinear { u, v, w } => {
                let ua: f32 = u.iter().zip(a.iter()).map(|(x, y)| x * y).sum();
                let vb: f32 = v.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let m = ua * vb;
                for (c_ij, w_ij) in c.iter_mut().zip(w.iter()) {
                    *c_ij += w_ij * m;
                }
            }
        }
    }
}

/// The action set of the environment, fixed for a run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum ActionSetConfig {
    /// Action `k` adds `A[:, k] ⊗ B[k, :]`. If `signed`, action `n + k` subtracts it.
    OuterProducts {
        /// Include the subtracting actions.
        signed: bool,
    },

    /// Action `(i, k, j)` adds `A[i, k] * B[k, j]` to `C[i, j]`. If `signed`, the
    /// subtracting actions follow the adding ones.
    ScalarProducts {
        /// Include the subtracting actions.
        signed: bool,
    },

    /// The seven products of Strassen's algorithm, for `n = 2` only.
    Strassen,

    /// Explicit actions.
    Custom(Vec<SymbolicAction>),
}

impl Default for ActionSetConfig {
    fn default() -> Self {
        Self::OuterProducts { signed: false }
    }
}

impl ActionSetConfig {
    /// Enumerates the actions for `n x n` matrices.
    pub fn build(&self, n: usize) -> Result<Vec<SymbolicAction>> {
        let signs: &[f32] = match self {
            Self::OuterProducts { signed: true } | Self::ScalarProducts { signed: true } => {
                &[1.0, -1.0]
            }
            _ => &[1.0],
        };

        let actions = match self {
            Self::OuterProducts { .. } => signs
                .iter()
                .flat_map(|&sign| {
                    (0..n).map(move |k| {
                        SymbolicAction::new(SymbolicOp::OuterProduct { ks: vec![k], sign })
                    })
                })
                .collect(),
            Self::ScalarProducts { .. } => {
                let mut actions = vec![];
                for &sign in signs {
                    for i in 0..n {
                        for k in 0..n {
                            for j in 0..n {
                                actions.push(SymbolicAction::new(SymbolicOp::ScalarProduct {
                                    i,
                                    k,
                                    j,
                                    sign,
                                }));
                            }
                        }
                    }
                }
                actions
            }
            Self::Strassen => {
                if n != 2 {
                    bail!(AlphamatError::Config(format!(
                        "the Strassen action set needs n = 2, got {}",
                        n
                    )));
                }
                strassen()
            }
            Self::Custom(actions) => actions.clone(),
        };

        if actions.is_empty() {
            bail!(AlphamatError::Config("the action set is empty".into()));
        }
        for action in actions.iter() {
            action.validate(n)?;
        }
        Ok(actions)
    }
}

/// Strassen's seven products over row-major `vec(A) = [a11, a12, a21, a22]`.
fn strassen() -> Vec<SymbolicAction> {
    let uvw: [([f32; 4], [f32; 4], [f32; 4]); 7] = [
        ([1., 0., 0., 1.], [1., 0., 0., 1.], [1., 0., 0., 1.]),
        ([0., 0., 1., 1.], [1., 0., 0., 0.], [0., 0., 1., -1.]),
        ([1., 0., 0., 0.], [0., 1., 0., -1.], [0., 1., 0., 1.]),
        ([0., 0., 0., 1.], [-1., 0., 1., 0.], [1., 0., 1., 0.]),
        ([1., 1., 0., 0.], [0., 0., 0., 1.], [-1., 1., 0., 0.]),
        ([-1., 0., 1., 0.], [1., 1., 0., 0.], [0., 0., 0., 1.]),
        ([0., 1., 0., -1.], [0., 0., 1., 1.], [1., 0., 0., 0.]),
    ];
    uvw.iter()
        .map(|(u, v, w)| {
            SymbolicAction::new(SymbolicOp::Bilinear {
                u: u.to_vec(),
                v: v.to_vec(),
                w: w.to_vec(),
            })
        })
        .collect()
}
