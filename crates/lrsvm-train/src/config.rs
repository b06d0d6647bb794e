//! Training configuration.

use serde::{Deserialize, Serialize};

/// Everything a training run needs besides the data. Identical on every rank.
///
/// ```
/// # use lrsvm_train::SvmConfig;
/// let config = SvmConfig::new(1.0, 0.01, 1e-4)
///     .with_target_rank(3)
///     .with_trials(1);
/// assert_eq!(config.rank_for(3), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvmConfig {
    /// SVM regularization constant.
    pub c: f64,
    pub learn_rate: f64,
    /// Dual ascent stops once the L1 change of `Uᵀβ` falls to this value.
    pub thresh: f64,
    /// Target rank k. `None` means the full column count d.
    pub target_rank: Option<usize>,
    pub power_iterations: usize,
    /// Seed of the shared random projection.
    pub seed: u64,
    /// Independent repetitions of the whole SVD + dual ascent pipeline.
    pub trials: usize,
    /// Evaluate the primal hinge objective every iteration.
    pub track_cost: bool,
    /// Optional bound on dual-ascent iterations.
    pub max_iterations: Option<u64>,
    /// Progress log interval, in iterations.
    pub log_every: u64,
}

impl SvmConfig {
    pub fn new(c: f64, learn_rate: f64, thresh: f64) -> Self {
        Self {
            c,
            learn_rate,
            thresh,
            target_rank: None,
            power_iterations: 1,
            seed: 137,
            trials: 5,
            track_cost: false,
            max_iterations: None,
            log_every: 100,
        }
    }

    pub fn with_target_rank(mut self, k: usize) -> Self {
        self.target_rank = Some(k);
        self
    }

    pub fn with_power_iterations(mut self, n: usize) -> Self {
        self.power_iterations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.trials = n;
        self
    }

    pub fn with_track_cost(mut self, on: bool) -> Self {
        self.track_cost = on;
        self
    }

    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_log_every(mut self, n: u64) -> Self {
        self.log_every = n;
        self
    }

    /// Target rank for data with `d` columns (bias included).
    pub fn rank_for(&self, d: usize) -> usize {
        self.target_rank.unwrap_or(d)
    }

    /// Dual-ascent step: `floor(1/(learn_rate·C) − 0.5) · learn_rate`.
    ///
    /// Not checked for positivity. A zero learning rate gives NaN.
    pub fn step_size(&self) -> f64 {
        (1.0 / (self.learn_rate * self.c) - 0.5).floor() * self.learn_rate
    }
}
