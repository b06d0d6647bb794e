use crate::DMat;

/// LU decomposition with partial pivoting: PA = LU
///
/// The factorization never refuses its input. A zero pivot is recorded in
/// [`Lu::is_singular`] and elimination carries on, so every downstream
/// solve of a singular matrix produces non-finite values instead of an
/// error. Callers that must not see that state check the flag first.
pub struct Lu {
    /// Combined L (lower, unit diagonal) and U (upper) in one matrix.
    lu: DMat,
    /// Row permutation: row i of PA is row piv[i] of A.
    piv: Vec<usize>,
    /// Set when some pivot fell below machine epsilon.
    singular: bool,
}

impl Lu {
    /// Compute LU decomposition of a square matrix.
    pub fn new(a: &DMat) -> Self {
        assert!(a.is_square(), "LU: matrix must be square");
        let n = a.nrows();
        let mut lu = a.clone();
        let mut piv: Vec<usize> = (0..n).collect();
        let mut singular = false;

        for k in 0..n {
            let col_k = lu.col(k);
            let mut max_val = 0.0;
            let mut max_row = k;
            for (i, v) in col_k.iter().enumerate().skip(k) {
                if v.abs() > max_val {
                    max_val = v.abs();
                    max_row = i;
                }
            }

            if max_val < f64::EPSILON {
                singular = true;
            }

            if max_row != k {
                lu.swap_rows(k, max_row);
                piv.swap(k, max_row);
            }

            let pivot_inv = lu.get(k, k).recip();

            let col_k = lu.col_mut(k);
            for v in &mut col_k[k + 1..] {
                *v *= pivot_inv;
            }

            // Schur complement update, column by column.
            let data = lu.as_mut_slice();
            for j in (k + 1)..n {
                let u_kj = data[j * n + k];
                for i in (k + 1)..n {
                    data[j * n + i] -= data[k * n + i] * u_kj;
                }
            }
        }

        Self { lu, piv, singular }
    }

    /// Whether a zero (below epsilon) pivot was met.
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// Solve L·Z = P·B for Z (unit lower triangular, forward substitution).
    pub fn forward_substitute(&self, b: &DMat) -> DMat {
        let n = self.lu.nrows();
        assert_eq!(b.nrows(), n, "LU forward_substitute: dimension mismatch");
        let mut z = DMat::from_fn(n, b.ncols(), |i, j| b.get(self.piv[i], j));
        for c in 0..z.ncols() {
            let col = z.col_mut(c);
            for j in 0..n {
                let zj = col[j];
                if zj == 0.0 {
                    continue;
                }
                for i in (j + 1)..n {
                    col[i] -= self.lu.get(i, j) * zj;
                }
            }
        }
        z
    }

    /// Solve U·W = Z for W (upper triangular, back substitution).
    pub fn back_substitute(&self, z: &DMat) -> DMat {
        let n = self.lu.nrows();
        assert_eq!(z.nrows(), n, "LU back_substitute: dimension mismatch");
        let mut w = z.clone();
        for c in 0..w.ncols() {
            let col = w.col_mut(c);
            for j in (0..n).rev() {
                col[j] *= self.lu.get(j, j).recip();
                let wj = col[j];
                for i in 0..j {
                    col[i] -= self.lu.get(i, j) * wj;
                }
            }
        }
        w
    }

    /// Inverse: forward solve L·Z = P·I, then back solve U·W = Z.
    pub fn inverse(&self) -> DMat {
        let n = self.lu.nrows();
        let z = self.forward_substitute(&DMat::identity(n));
        self.back_substitute(&z)
    }
}

/// Inverse of a square matrix through [`Lu`].
///
/// Precondition: `m` is non-singular. This is not checked; a singular
/// input yields a matrix with infinite or NaN entries.
pub fn inverse(m: &DMat) -> DMat {
    Lu::new(m).inverse()
}
