//! Holdout evaluation.

use lrsvm_la::DMat;

use crate::data::Partition;

/// Prediction counts on a labelled set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    /// Correct predictions in percent. An empty set scores 0.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.total as f64
    }
}

/// Classify each row of `holdout` by the sign of `[x, 1]·w`. A score of
/// exactly zero counts as the negative class.
///
/// `w` must have `holdout.dim()` rows; [`Trainer::fit`](crate::Trainer::fit)
/// rejects a holdout of the wrong width before training.
pub fn accuracy(holdout: &Partition, w: &DMat) -> Accuracy {
    let scores = holdout.x().mul_mat(w);
    let correct = scores
        .as_slice()
        .iter()
        .zip(holdout.labels().iter())
        .filter(|(&score, &label)| (score > 0.0) == (label == 1.0))
        .count();
    Accuracy { correct, total: holdout.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use lrsvm_la::DVec;

    #[test]
    fn counts_sign_agreement() {
        let holdout = Dataset::new(
            DMat::column(&[3.0, -2.0, 0.5, -0.5]),
            DVec::from_slice(&[1.0, -1.0, -1.0, -1.0]),
        )
        .unwrap()
        .into_partition();
        // score = x, bias weight 0
        let acc = accuracy(&holdout, &DMat::column(&[1.0, 0.0]));
        assert_eq!(acc, Accuracy { correct: 3, total: 4 });
        assert_eq!(acc.percent(), 75.0);
    }

    #[test]
    fn zero_score_is_negative() {
        let holdout = Dataset::new(DMat::column(&[1.0]), DVec::from_slice(&[-1.0]))
            .unwrap()
            .into_partition();
        assert_eq!(accuracy(&holdout, &DMat::zeros(2, 1)).correct, 1);
    }
}
