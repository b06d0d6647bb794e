//! Distributed randomized SVD of a row-partitioned tall-and-skinny matrix.
//!
//! Each rank holds `X̂_i` (n_i × d). The engine produces `X̂ ≈ U·S·Vᵀ` with
//! `U` distributed by rows and `S`, `V` replicated. Only k × k and d × k
//! matrices ever cross the wire.
//!
//! ```text
//! y_i  = X̂_i · Ω                    Ω: shared-seed uniform d × k, never sent
//! Q_i  = orthonormalize(y_i)
//! repeat power_iterations:
//!     AtQ = Σ X̂_iᵀ Q_i              gather + sum, broadcast
//!     Q_i = orthonormalize(X̂_i · AtQ)
//! AtQ  = Σ X̂_iᵀ Q_i
//! AtQᵀAtQ = E Λ Eᵀ                   coordinator, E broadcast
//! S = √Λ,  V = AtQ · E · S⁻¹,  U_i = Q_i · E
//! ```

use lrsvm_la::{inverse, DMat, DVec, Qr, SymmetricEigen};
use lrsvm_mesh::{CommCounter, Communicator, MeshError, Reduction};
use tracing::{debug, warn};

use crate::rng::Rng;

/// Result of the decomposition as seen by one rank.
#[derive(Clone, Debug)]
pub struct LowRankFactors {
    /// This rank's n_i × k block of U.
    pub u: DMat,
    /// Singular values, ascending. Replicated.
    pub singular_values: DVec,
    /// d × k right singular vectors. Replicated.
    pub v: DMat,
}

impl LowRankFactors {
    /// Target rank k.
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// S as a k × k diagonal matrix.
    pub fn s(&self) -> DMat {
        DMat::from_diagonal(&self.singular_values)
    }

    /// False when any factor holds NaN or an infinity.
    ///
    /// A target rank above the rank of the data gets here: the stacked R is
    /// numerically singular and the trailing eigenvalues of `AtQᵀAtQ` can
    /// round below zero, whose square root is NaN.
    pub fn is_finite(&self) -> bool {
        self.u.is_finite() && self.v.is_finite() && self.singular_values.iter().all(|s| s.is_finite())
    }

    /// This rank's rows of U·S·Vᵀ.
    pub fn reconstruct_local(&self) -> DMat {
        self.u.mul_mat(&self.s()).mul_mat(&self.v.transpose())
    }
}

/// Runs the decomposition on one rank. All ranks must run it together.
pub struct SvdEngine<'a> {
    comm: &'a Communicator,
    target_rank: usize,
    power_iterations: usize,
    seed: u64,
}

impl<'a> SvdEngine<'a> {
    pub fn new(comm: &'a Communicator, target_rank: usize, power_iterations: usize, seed: u64) -> Self {
        Self { comm, target_rank, power_iterations, seed }
    }

    /// The d × k random projection. Identical on every rank for a given seed.
    pub fn projection(&self, d: usize) -> DMat {
        Rng::new(self.seed).uniform_matrix(d, self.target_rank)
    }

    /// Decompose this rank's `x_hat`, charging communication to `comm_volume`.
    pub async fn run(
        &self,
        x_hat: &DMat,
        comm_volume: &mut CommCounter,
    ) -> Result<LowRankFactors, MeshError> {
        let k = self.target_rank;
        let y = x_hat.mul_mat(&self.projection(x_hat.ncols()));
        let mut q = self.orthonormalize(&y, comm_volume).await?;

        for it in 0..self.power_iterations {
            let atq = self.gather_atq(x_hat, &q, comm_volume).await?;
            q = self.orthonormalize(&x_hat.mul_mat(&atq), comm_volume).await?;
            debug!(iteration = it + 1, "power iteration done");
        }

        let atq = self.gather_atq(x_hat, &q, comm_volume).await?;

        // Eigenvectors and eigenvalues travel as one (k + 1) × k block; only
        // the eigenvectors are charged.
        let spectrum = self.comm.is_coordinator().then(|| {
            let eig = SymmetricEigen::new(&atq.tr_mul(&atq));
            let values = DMat::from_fn(1, k, |_, j| eig.eigenvalues[j]);
            DMat::vstack(&[eig.eigenvectors, values])
        });
        let spectrum = self.comm.broadcast(spectrum.as_ref()).await?;
        comm_volume.charge(k * k);

        let e = spectrum.rows(0, k);
        let singular_values = DVec::from_fn(k, |j| spectrum.get(k, j).sqrt());
        let s_inv = inverse(&DMat::from_diagonal(&singular_values));
        let v = atq.mul_mat(&e).mul_mat(&s_inv);
        let u = q.mul_mat(&e);

        let factors = LowRankFactors { u, singular_values, v };
        if !factors.is_finite() {
            warn!(
                target_rank = k,
                "low-rank factors are not finite, target rank may exceed the rank of the data"
            );
        }
        debug!(target_rank = k, largest = ?factors.singular_values.as_slice().last(), "low-rank factors ready");
        Ok(factors)
    }

    /// Orthonormalize the distributed column space of `y`.
    ///
    /// Every rank's local R is stacked at the coordinator, whose QR gives the
    /// R of the full matrix; its inverse comes back and `Q_i = y_i · R⁻¹`.
    /// A rank with fewer rows than k contributes a zero-padded R.
    pub async fn orthonormalize(
        &self,
        y: &DMat,
        comm_volume: &mut CommCounter,
    ) -> Result<DMat, MeshError> {
        let k = self.target_rank;
        let r_local = Qr::new(y).r();

        let stacked = self.comm.reduce(&r_local, Reduction::Stack).await?;
        comm_volume.charge(k * k);

        let r_inv = stacked.map(|s| inverse(&Qr::new(&s).r()));
        let r_inv = self.comm.broadcast(r_inv.as_ref()).await?;
        comm_volume.charge(k * k);

        Ok(y.mul_mat(&r_inv))
    }

    /// `Σ_i X̂_iᵀ·Q_i`, replicated on every rank.
    pub async fn gather_atq(
        &self,
        x_hat: &DMat,
        q: &DMat,
        comm_volume: &mut CommCounter,
    ) -> Result<DMat, MeshError> {
        let elements = x_hat.ncols() * self.target_rank;
        let partial = x_hat.tr_mul(q);

        let sum = self.comm.gather_sum(&partial).await?;
        comm_volume.charge(elements);
        let atq = self.comm.broadcast(sum.as_ref()).await?;
        comm_volume.charge(elements);
        Ok(atq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng_value(rng: &mut Rng) -> f64 {
        rng.next_f64() * 2.0 - 1.0
    }

    #[tokio::test]
    async fn single_rank_full_rank_reconstruction() {
        let x = {
            let mut rng = Rng::new(5);
            let data = (0..20 * 4).map(|_| rng_value(&mut rng)).collect();
            DMat::from_raw(20, 4, data)
        };
        let comm = Communicator::single();
        let mut volume = CommCounter::new(1);
        let f = SvdEngine::new(&comm, 4, 1, 137).run(&x, &mut volume).await.unwrap();

        let recon = f.reconstruct_local();
        assert!((&recon - &x).norm() < 1e-8 * x.norm());
        let utu = f.u.tr_mul(&f.u);
        assert!((&utu - &DMat::identity(4)).norm() < 1e-9);
        assert_eq!(volume.scalars(), 0);
    }

    #[tokio::test]
    async fn singular_values_ascend_and_match_gram() {
        let x = DMat::from_row_slice(
            4,
            2,
            &[3.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        );
        let comm = Communicator::single();
        let mut volume = CommCounter::new(1);
        let f = SvdEngine::new(&comm, 2, 2, 137).run(&x, &mut volume).await.unwrap();
        assert!((f.singular_values[0] - 1.0).abs() < 1e-10);
        assert!((f.singular_values[1] - 3.0).abs() < 1e-10);
    }
}
