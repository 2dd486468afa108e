#![warn(missing_docs)]
//! Environment for the discovery of matrix multiplication algorithms.
//!
//! An episode asks for the product `AB` of two `n x n` matrices. Starting from
//! an estimate `C`, the agent picks symbolic operations from a finite action set
//! ([`ActionSetConfig`]) such as rank-one outer products or the bilinear
//! products of Strassen's algorithm. Each operation updates `C`, and the reward
//! penalizes the remaining error `‖C - AB‖_F`, the elapsed steps and the
//! symbolic cost of the operation.
//!
//! ```
//! use alphamat_core::Env;
//! use alphamat_env::{DiscoveryEnv, DiscoveryEnvConfig, MatmulAct};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = DiscoveryEnvConfig::from_env_id("matmul-2x2-strassen")?;
//! let mut env = DiscoveryEnv::build(&config, 0)?;
//! env.reset_with_index(0)?;
//! let mut done = false;
//! for k in 0..7 {
//!     let (step, _) = env.step(&MatmulAct(k))?;
//!     done = step.is_done();
//! }
//! assert!(done);
//! assert!(env.error_norm() < config.epsilon);
//! # Ok(())
//! # }
//! ```
mod action;
mod config;
mod env;
mod evaluator;
mod matrix;
mod obs;
pub use action::{ActionSetConfig, SymbolicAction, SymbolicOp};
pub use config::{DiscoveryEnvConfig, RewardConfig};
pub use env::{DiscoveryEnv, DiscoveryInfo};
pub use evaluator::{DiscoveryEvaluator, EvalStats};
pub use matrix::{frobenius_distance, is_finite, EstimatePrior, MatrixDistribution};
pub use obs::{MatmulAct, MatmulActBatch, MatmulObs, MatmulObsBatch};
