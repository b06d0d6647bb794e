//! Primal view of the dual solution.

use lrsvm_la::DMat;

use crate::data::Partition;
use crate::svd::LowRankFactors;

/// Primal weights `w = V·S·α̂` (d × 1, bias last) from the k × 1 dual iterate.
pub fn primal_weights(factors: &LowRankFactors, alpha: &DMat) -> DMat {
    let s_alpha = DMat::from_fn(alpha.nrows(), 1, |i, _| factors.singular_values[i] * alpha.get(i, 0));
    factors.v.mul_mat(&s_alpha)
}

/// This rank's share of the hinge loss: `Σ max(0, 1 − yᵢ·xᵢᵀw)`.
///
/// The primal objective reported during training is C times the sum of
/// this over all ranks.
pub fn hinge_sum(partition: &Partition, w: &DMat) -> f64 {
    let margins = partition.x_hat().mul_mat(w);
    margins.as_slice().iter().map(|m| (1.0 - m).max(0.0)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use lrsvm_la::DVec;

    #[test]
    fn weights_from_identity_factors() {
        let f = LowRankFactors {
            u: DMat::identity(2),
            singular_values: DVec::from_slice(&[2.0, 3.0]),
            v: DMat::identity(2),
        };
        let w = primal_weights(&f, &DMat::column(&[1.0, -1.0]));
        assert_eq!(w, DMat::column(&[2.0, -3.0]));
    }

    #[test]
    fn hinge_counts_only_violations() {
        // Rows with bias: [2, 1], [-1, 1]; labels +1, -1.
        let ds = Dataset::new(
            DMat::column(&[2.0, -1.0]),
            DVec::from_slice(&[1.0, -1.0]),
        )
        .unwrap();
        let p = ds.into_partition();
        // w = [1, -0.5]: margins 1.5 and 1.5, both outside the hinge.
        assert_eq!(hinge_sum(&p, &DMat::column(&[1.0, -0.5])), 0.0);
        // w = 0: every margin is 0, loss 1 each.
        assert_eq!(hinge_sum(&p, &DMat::zeros(2, 1)), 2.0);
    }
}
