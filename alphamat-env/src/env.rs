//! The matrix multiplication discovery environment.
use crate::{
    frobenius_distance, is_finite, DiscoveryEnvConfig, MatmulAct, MatmulObs, SymbolicAction,
};
use alphamat_core::{
    error::AlphamatError,
    record::{Record, RecordValue::Scalar},
    Env, Info, Step,
};
use anyhow::{bail, Result};
use log::trace;
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};

/// Information of a step of [`DiscoveryEnv`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveryInfo {
    /// `‖C - AB‖_F` after the step.
    pub error_norm: f32,

    /// Symbolic cost of the episode so far.
    pub cumulative_cost: f32,

    /// Steps of the episode so far.
    pub steps: usize,

    /// The error fell below the threshold.
    pub converged: bool,
}

impl Info for DiscoveryInfo {}

/// Builds the product `AB` from symbolic operations.
///
/// An episode fixes a pair of `n x n` matrices `A` and `B` and starts from an
/// estimate `C` (zero by default). Each action applies a symbolic operation to
/// `C` and is rewarded with
///
/// ```text
/// r_t = -‖C_t+1 - AB‖_F - alpha * t - beta * cost(a_t)
/// ```
///
/// where `t` counts the steps before this one. The episode terminates when the
/// error falls below `epsilon` and is truncated after `max_steps` steps or when
/// no legal action is left.
///
/// A step producing non-finite values fails with
/// [`AlphamatError::NumericDivergence`] and leaves the state untouched. So does
/// a reset whose product `AB` is not finite.
///
/// A built environment holds zero matrices until its first reset.
pub struct DiscoveryEnv {
    config: DiscoveryEnvConfig,
    actions: Vec<SymbolicAction>,
    seed: i64,
    rng: StdRng,
    a: Array2<f32>,
    b: Array2<f32>,
    target: Array2<f32>,
    c: Array2<f32>,
    t: usize,
    use_counts: Vec<usize>,
    cumulative_cost: f32,
    error_norm: f32,
}

impl DiscoveryEnv {
    fn install(&mut self, a: Array2<f32>, b: Array2<f32>) -> Result<MatmulObs> {
        let n = self.config.n;
        if a.dim() != (n, n) || b.dim() != (n, n) {
            bail!(AlphamatError::Config(format!(
                "matrices must be {n}x{n}, got {:?} and {:?}",
                a.dim(),
                b.dim()
            )));
        }
        let target = a.dot(&b);
        if !(is_finite(&a) && is_finite(&b) && is_finite(&target)) {
            bail!(AlphamatError::NumericDivergence(
                "the product of the episode is not finite".into()
            ));
        }
        self.c = self.config.prior.init(n);
        self.error_norm = frobenius_distance(&self.c, &target);
        self.a = a;
        self.b = b;
        self.target = target;
        self.t = 0;
        self.use_counts = vec![0; self.actions.len()];
        self.cumulative_cost = 0.0;
        Ok(self.observation())
    }

    /// Resets the environment with matrices drawn from a generator seeded with `seed`.
    pub fn reset_with_seed(&mut self, seed: u64) -> Result<MatmulObs> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (a, b) = self.config.distribution.sample(self.config.n, &mut rng)?;
        self.install(a, b)
    }

    /// Resets the environment with the given matrices.
    pub fn reset_with_matrices(&mut self, a: Array2<f32>, b: Array2<f32>) -> Result<MatmulObs> {
        self.install(a, b)
    }

    /// The observation of the current state.
    pub fn observation(&self) -> MatmulObs {
        let mut features = Vec::with_capacity(self.config.obs_dim());
        features.extend(self.a.iter());
        features.extend(self.b.iter());
        if self.config.include_estimate {
            features.extend(self.c.iter());
        }
        MatmulObs {
            features,
            mask: self.action_mask(),
        }
    }

    /// Legality of each action in the current state.
    pub fn action_mask(&self) -> Vec<f32> {
        self.use_counts
            .iter()
            .map(|&count| match self.config.max_action_uses {
                Some(max) if count >= max => 0.0,
                _ => 1.0,
            })
            .collect()
    }

    /// The action set.
    pub fn actions(&self) -> &[SymbolicAction] {
        &self.actions
    }

    /// The number of actions.
    pub fn n_actions(&self) -> usize {
        self.actions.len()
    }

    /// The configuration.
    pub fn config(&self) -> &DiscoveryEnvConfig {
        &self.config
    }

    /// The running estimate `C`.
    pub fn estimate(&self) -> &Array2<f32> {
        &self.c
    }

    /// The matrices `A` and `B` of the episode.
    pub fn matrices(&self) -> (&Array2<f32>, &Array2<f32>) {
        (&self.a, &self.b)
    }

    /// `‖C - AB‖_F` of the current state.
    pub fn error_norm(&self) -> f32 {
        self.error_norm
    }

    /// Symbolic cost of the episode so far.
    pub fn cumulative_cost(&self) -> f32 {
        self.cumulative_cost
    }

    /// Steps of the episode so far.
    pub fn steps(&self) -> usize {
        self.t
    }

    fn check_action(&self, a: &MatmulAct) -> Result<()> {
        let index = a.0;
        if index >= self.actions.len() {
            bail!(AlphamatError::InvalidAction {
                index,
                reason: format!("the action set has {} actions", self.actions.len()),
            });
        }
        if let Some(max) = self.config.max_action_uses {
            if self.use_counts[index] >= max {
                bail!(AlphamatError::InvalidAction {
                    index,
                    reason: format!("already used {} times in this episode", max),
                });
            }
        }
        Ok(())
    }
}

impl Env for DiscoveryEnv {
    type Config = DiscoveryEnvConfig;
    type Obs = MatmulObs;
    type Act = MatmulAct;
    type Info = DiscoveryInfo;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        config.validate()?;
        let n = config.n;
        let actions = config.action_set.build(n)?;
        Ok(Self {
            config: config.clone(),
            use_counts: vec![0; actions.len()],
            actions,
            seed,
            rng: StdRng::seed_from_u64(seed as u64),
            a: Array2::zeros((n, n)),
            b: Array2::zeros((n, n)),
            target: Array2::zeros((n, n)),
            c: Array2::zeros((n, n)),
            t: 0,
            cumulative_cost: 0.0,
            error_norm: 0.0,
        })
    }

    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)> {
        self.check_action(a)?;
        let action = &self.actions[a.0];
        let n = self.config.n;

        // The step is computed on a copy and committed only if it is finite.
        let mut c = self.c.clone();
        action.apply(&self.a, &self.b, &mut c);
        if !is_finite(&c) {
            bail!(AlphamatError::NumericDivergence(format!(
                "action {} made the estimate non-finite",
                a.0
            )));
        }
        let error_norm = frobenius_distance(&c, &self.target);
        let cost = action.cost(n);
        let reward_config = &self.config.reward;
        let error_term = match reward_config.squared_error {
            true => error_norm * error_norm,
            false => error_norm,
        };
        let reward =
            -error_term - reward_config.alpha * self.t as f32 - reward_config.beta * cost;
        if !reward.is_finite() {
            bail!(AlphamatError::NumericDivergence(format!(
                "action {} gave a non-finite reward",
                a.0
            )));
        }

        self.c = c;
        self.t += 1;
        self.use_counts[a.0] += 1;
        self.cumulative_cost += cost;
        self.error_norm = error_norm;

        let obs = self.observation();
        let converged = error_norm < self.config.epsilon;
        let no_legal_action = obs.mask.iter().all(|&m| m == 0.0);
        let is_truncated = !converged && (self.t >= self.config.max_steps || no_legal_action);
        trace!(
            "step {}: action {}, error {}, reward {}",
            self.t,
            a.0,
            error_norm,
            reward
        );

        let info = DiscoveryInfo {
            error_norm,
            cumulative_cost: self.cumulative_cost,
            steps: self.t,
            converged,
        };
        let record = Record::from_slice(&[
            ("error_norm", Scalar(error_norm)),
            ("symbolic_cost", Scalar(self.cumulative_cost)),
            ("converged", Scalar(converged as i32 as f32)),
        ]);
        let step = Step::new(obs, *a, reward, converged, is_truncated, info);
        Ok((step, record))
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        let (a, b) = self
            .config
            .distribution
            .sample(self.config.n, &mut self.rng)?;
        self.install(a, b)
    }

    /// Resets the environment with matrices drawn with seed `seed + ix`.
    fn reset_with_index(&mut self, ix: usize) -> Result<Self::Obs> {
        self.reset_with_seed((self.seed as u64).wrapping_add(ix as u64))
    }
}
