//! Dual ascent for the linear SVM in the reduced space.
//!
//! With `X̂ ≈ U·S·Vᵀ` the dual only ever needs k-vectors. The coordinator
//! owns the k-dimensional state and solves the dense step; every rank
//! applies the non-negativity projection to its own rows of `U·β̂`.
//!
//! Per iteration, with `D⁻¹ = −(S·Sᵀ + I/(2C))⁻¹` fixed:
//!
//! ```text
//! coordinator:  α̂ = D⁻¹ (Uᵀe − β̄),   β̂ = β̄ − η α̂         broadcast β̂
//! every rank:   b_i = max(0, U_i β̂),  Σ U_iᵀ b_i → β̄'      gather + sum
//! coordinator:  err = ‖β̄' − β̄‖₁,     β̄ = β̄'              broadcast err
//! ```

use std::time::{Duration, Instant};

use lrsvm_la::{inverse, DMat};
use lrsvm_mesh::{CommCounter, Communicator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SvmConfig;
use crate::data::Partition;
use crate::error::TrainError;
use crate::objective::{hinge_sum, primal_weights};
use crate::svd::LowRankFactors;

/// Why the iteration stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The error fell to the threshold.
    Converged,
    /// The error became NaN.
    NonFinite,
    /// `max_iterations` was reached first.
    IterationCap,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NonFinite => "non-finite",
            Self::IterationCap => "iteration cap",
        }
    }
}

/// What one rank knows after the loop.
#[derive(Clone, Debug)]
pub struct DualOutcome {
    pub iterations: u64,
    /// Last broadcast error. Replicated.
    pub error: f64,
    pub termination: Termination,
    /// Last β̂. Replicated.
    pub beta: DMat,
    /// Last α̂. Coordinator only.
    pub alpha: Option<DMat>,
    /// `C · Σ hinge` per iteration when cost tracking is on. Coordinator only.
    pub costs: Vec<f64>,
    /// Wall time of the iteration loop.
    pub loop_time: Duration,
}

/// Coordinator-owned k-dimensional state.
struct DualState {
    inv_d: DMat,
    ut_e: DMat,
    prev_beta_cap: DMat,
    alpha: DMat,
    step: f64,
}

impl DualState {
    fn new(factors: &LowRankFactors, ut_e: DMat, c: f64, step: f64) -> Self {
        let k = factors.rank();
        let s = factors.s();
        let ridge = DMat::identity(k).scale(0.5 / c);
        let d = -&(&s.mul_mat(&s.transpose()) + &ridge);
        Self {
            inv_d: inverse(&d),
            ut_e,
            prev_beta_cap: DMat::filled(k, 1, 1.0),
            alpha: DMat::zeros(k, 1),
            step,
        }
    }

    /// α̂ and β̂ from the current β̄.
    fn next_beta(&mut self) -> DMat {
        self.alpha = self.inv_d.mul_mat(&(&self.ut_e - &self.prev_beta_cap));
        &self.prev_beta_cap - &self.alpha.scale(self.step)
    }

    /// Adopt the new `Uᵀb` and return the L1 change.
    fn absorb(&mut self, beta_cap: DMat) -> f64 {
        let error = (&beta_cap - &self.prev_beta_cap).l1_norm();
        self.prev_beta_cap = beta_cap;
        error
    }
}

/// The coordinator carries [`DualState`]; workers carry nothing.
enum DualRole {
    Coordinator(Box<DualState>),
    Worker,
}

impl DualRole {
    fn next_beta(&mut self) -> Option<DMat> {
        match self {
            Self::Coordinator(state) => Some(state.next_beta()),
            Self::Worker => None,
        }
    }

    fn absorb(&mut self, beta_cap: Option<DMat>) -> Option<f64> {
        match (self, beta_cap) {
            (Self::Coordinator(state), Some(cap)) => Some(state.absorb(cap)),
            _ => None,
        }
    }

    fn alpha(&self) -> Option<&DMat> {
        match self {
            Self::Coordinator(state) => Some(&state.alpha),
            Self::Worker => None,
        }
    }
}

/// Clamp negatives to zero. NaN passes through so a diverged iterate is
/// reported instead of silently reset.
pub fn project_nonnegative(m: &DMat) -> DMat {
    m.map(|x| if x < 0.0 { 0.0 } else { x })
}

/// Runs dual ascent on one rank. All ranks must run it together.
pub struct DualAscent<'a> {
    comm: &'a Communicator,
    config: &'a SvmConfig,
}

impl<'a> DualAscent<'a> {
    pub fn new(comm: &'a Communicator, config: &'a SvmConfig) -> Self {
        Self { comm, config }
    }

    pub async fn run(
        &self,
        factors: &LowRankFactors,
        partition: &Partition,
        comm_volume: &mut CommCounter,
    ) -> Result<DualOutcome, TrainError> {
        let k = factors.rank();
        let u = &factors.u;

        // Uᵀ·(−1), summed at the coordinator.
        let ut_e_local = DMat::from_fn(k, 1, |j, _| -u.col(j).iter().sum::<f64>());
        let ut_e = self.comm.gather_sum(&ut_e_local).await?;
        comm_volume.charge(k);

        let step = self.config.step_size();
        let mut role = match ut_e {
            Some(ut_e) => DualRole::Coordinator(Box::new(DualState::new(factors, ut_e, self.config.c, step))),
            None => DualRole::Worker,
        };
        debug!(step, target_rank = k, "dual ascent setup done");

        let thresh = self.config.thresh;
        let started = Instant::now();
        let mut iterations = 0u64;
        let mut error = 1.0;
        let mut beta = DMat::zeros(k, 1);
        let mut costs = Vec::new();

        // `!(error > thresh)` and not `error <= thresh`: NaN has to stop the loop.
        #[allow(clippy::neg_cmp_op_on_partial_ord)]
        let termination = loop {
            if !(error > thresh) {
                break if error.is_nan() { Termination::NonFinite } else { Termination::Converged };
            }
            if self.config.max_iterations.is_some_and(|cap| iterations >= cap) {
                break Termination::IterationCap;
            }
            iterations += 1;

            let next = role.next_beta();
            beta = self.comm.broadcast(next.as_ref()).await?;
            comm_volume.charge(k);

            let updated = project_nonnegative(&u.mul_mat(&beta));
            debug_assert!(
                updated.as_slice().iter().all(|x| !(*x < 0.0)),
                "projected iterate has a negative entry"
            );
            let partial_cap = u.tr_mul(&updated);
            let beta_cap = self.comm.gather_sum(&partial_cap).await?;
            comm_volume.charge(k);

            let local_error = role.absorb(beta_cap);
            error = self.comm.broadcast_scalar(local_error).await?;

            if self.config.track_cost {
                let alpha = self.comm.broadcast(role.alpha()).await?;
                let w = primal_weights(factors, &alpha);
                let total = self.comm.all_reduce_scalar(hinge_sum(partition, &w)).await?;
                if self.comm.is_coordinator() {
                    costs.push(total * self.config.c);
                }
            }

            if self.comm.is_coordinator() && iterations % self.config.log_every.max(1) == 0 {
                info!(iteration = iterations, error, "dual ascent progress");
            }
        };

        let outcome = DualOutcome {
            iterations,
            error,
            termination,
            beta,
            alpha: role.alpha().cloned(),
            costs,
            loop_time: started.elapsed(),
        };
        debug!(iterations, error, termination = termination.as_str(), "dual ascent finished");
        Ok(outcome)
    }
}
