//! Matrices of the environment and the distributions they are drawn from.
use alphamat_core::error::AlphamatError;
use anyhow::{bail, Result};
use ndarray::Array2;
use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Distribution of the entries of the matrices `A` and `B`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum MatrixDistribution {
    /// Entries drawn uniformly from `[low, high)`.
    Uniform {
        /// Lower bound.
        low: f32,
        /// Upper bound.
        high: f32,
    },

    /// Entries drawn from a normal distribution.
    Normal {
        /// Mean.
        mean: f32,
        /// Standard deviation.
        std: f32,
    },

    /// Integer entries drawn uniformly from `[low, high]`.
    Integer {
        /// Lower bound.
        low: i32,
        /// Upper bound, inclusive.
        high: i32,
    },

    /// The same pair in every episode, given row-major.
    Fixed {
        /// Entries of `A`.
        a: Vec<f32>,
        /// Entries of `B`.
        b: Vec<f32>,
    },
}

impl Default for MatrixDistribution {
    fn default() -> Self {
        Self::Uniform {
            low: -1.0,
            high: 1.0,
        }
    }
}

impl MatrixDistribution {
    /// Checks the parameters of the distribution for `n x n` matrices.
    pub fn validate(&self, n: usize) -> Result<()> {
        match self {
            Self::Uniform { low, high } => {
                if !(low < high && (high - low).is_finite()) {
                    bail!(AlphamatError::Config(format!(
                        "uniform distribution needs low < high with a finite width, got [{}, {})",
                        low, high
                    )));
                }
            }
            Self::Normal { mean, std } => {
                if !(mean.is_finite() && std.is_finite() && *std > 0.0) {
                    bail!(AlphamatError::Config(format!(
                        "normal distribution needs a finite mean and std > 0, got ({}, {})",
                        mean, std
                    )));
                }
                Self::normal(*mean, *std)?;
            }
            Self::Integer { low, high } => {
                if low > high {
                    bail!(AlphamatError::Config(format!(
                        "integer distribution needs low <= high, got [{}, {}]",
                        low, high
                    )));
                }
            }
            Self::Fixed { a, b } => {
                if a.len() != n * n || b.len() != n * n {
                    bail!(AlphamatError::Config(format!(
                        "fixed matrices need {} entries, got {} and {}",
                        n * n,
                        a.len(),
                        b.len()
                    )));
                }
                if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
                    bail!(AlphamatError::Config("fixed matrices must be finite".into()));
                }
            }
        }
        Ok(())
    }

    /// Draws a pair of `n x n` matrices.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Result<(Array2<f32>, Array2<f32>)> {
        self.validate(n)?;
        let entries: Vec<f32> = match self {
            Self::Fixed { a, b } => {
                return Ok((
                    Array2::from_shape_vec((n, n), a.clone())?,
                    Array2::from_shape_vec((n, n), b.clone())?,
                ))
            }
            Self::Uniform { low, high } => {
                let dist = Uniform::new(*low, *high);
                dist.sample_iter(rng).take(2 * n * n).collect()
            }
            Self::Normal { mean, std } => {
                let dist = Self::normal(*mean, *std)?;
                dist.sample_iter(rng).take(2 * n * n).collect()
            }
            Self::Integer { low, high } => {
                let dist = Uniform::new_inclusive(*low, *high);
                dist.sample_iter(rng).take(2 * n * n).map(|v| v as f32).collect()
            }
        };
        let b = Array2::from_shape_vec((n, n), entries[n * n..].to_vec())?;
        let a = Array2::from_shape_vec((n, n), entries[..n * n].to_vec())?;
        Ok((a, b))
    }

    fn normal(mean: f32, std: f32) -> Result<Normal<f32>> {
        Normal::new(mean, std).map_err(|e| {
            AlphamatError::Config(format!("normal distribution ({}, {}): {}", mean, std, e)).into()
        })
    }
}


/// Initial value of the running estimate `C`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub enum EstimatePrior {
    /// All zeros.
    #[default]
    Zero,

    /// All entries set to the given value.
    Constant(f32),
}

impl EstimatePrior {
    /// Returns the initial `n x n` estimate.
    pub fn init(&self, n: usize) -> Array2<f32> {
        match self {
            Self::Zero => Array2::zeros((n, n)),
            Self::Constant(v) => Array2::from_elem((n, n), *v),
        }
    }
}

/// Frobenius norm of `x - y`.
pub fn frobenius_distance(x: &Array2<f32>, y: &Array2<f32>) -> f32 {
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}

/// Returns `true` if all entries are finite.
pub fn is_finite(x: &Array2<f32>) -> bool {
    x.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_samples_are_deterministic() -> Result<()> {
        let dist = MatrixDistribution::Normal { mean: 0.0, std: 1.0 };
        let (a1, b1) = dist.sample(3, &mut StdRng::seed_from_u64(5))?;
        let (a2, b2) = dist.sample(3, &mut StdRng::seed_from_u64(5))?;
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
        assert!(is_finite(&a1) && is_finite(&b1));
        Ok(())
    }

    #[test]
    fn test_integer_entries() -> Result<()> {
        let dist = MatrixDistribution::Integer { low: -2, high: 2 };
        let (a, b) = dist.sample(4, &mut StdRng::seed_from_u64(0))?;
        for v in a.iter().chain(b.iter()) {
            assert_eq!(v.fract(), 0.0);
            assert!((-2.0..=2.0).contains(v));
        }
        Ok(())
    }

    #[test]
    fn test_validate() {
        assert!(MatrixDistribution::Uniform { low: 1.0, high: 1.0 }.validate(2).is_err());
        assert!(MatrixDistribution::Normal { mean: 0.0, std: 0.0 }.validate(2).is_err());
        assert!(MatrixDistribution::Normal { mean: 0.0, std: f32::NAN }.validate(2).is_err());
        let fixed = MatrixDistribution::Fixed {
            a: vec![1.0; 4],
            b: vec![1.0; 3],
        };
        assert!(fixed.validate(2).is_err());
    }

    #[test]
    fn test_uniform_width_must_be_finite() {
        let wide = MatrixDistribution::Uniform {
            low: -3e38,
            high: 3e38,
        };
        let err = wide.validate(2).err().unwrap();
        assert_eq!(
            err.downcast_ref::<AlphamatError>().map(|e| e.kind()),
            Some("config")
        );
        assert!(wide.sample(2, &mut StdRng::seed_from_u64(0)).is_err());
        assert!(MatrixDistribution::Uniform {
            low: -1e38,
            high: 1e38
        }
        .validate(2)
        .is_ok());
    }

    #[test]
    fn test_normal_entries_follow_moments() -> Result<()> {
        let dist = MatrixDistribution::Normal { mean: 2.0, std: 0.5 };
        let mut rng = StdRng::seed_from_u64(1);
        let mut values = vec![];
        for _ in 0..100 {
            let (a, b) = dist.sample(4, &mut rng)?;
            values.extend(a.iter().chain(b.iter()).copied());
        }
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!((mean - 2.0).abs() < 0.05);
        assert!((var.sqrt() - 0.5).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn test_frobenius_distance() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![[1.0, 2.0], [3.0, 0.0]];
        assert_eq!(frobenius_distance(&x, &y), 4.0);
        assert_eq!(frobenius_distance(&x, &x), 0.0);
    }
}
