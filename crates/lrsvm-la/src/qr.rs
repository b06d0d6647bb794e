use crate::DMat;

/// Economy QR decomposition via Householder reflections: A = Q * R
///
/// Only `R` is ever needed by the distributed orthogonalization, so the
/// reflectors are applied in place and `Q` is never accumulated.
pub struct Qr {
    /// Householder vectors below the diagonal, R above it.
    qr: DMat,
    /// Diagonal of R.
    r_diag: Vec<f64>,
}

impl Qr {
    /// Compute the factorization.
    pub fn new(a: &DMat) -> Self {
        let m = a.nrows();
        let n = a.ncols();
        let mut qr = a.clone();
        let mut r_diag = Vec::with_capacity(n.min(m));

        for k in 0..n.min(m) {
            let norm_sq: f64 = qr.col(k)[k..].iter().map(|x| x * x).sum();
            let mut norm = norm_sq.sqrt();

            if norm > f64::EPSILON {
                if qr.get(k, k) > 0.0 {
                    norm = -norm;
                }

                for v in &mut qr.col_mut(k)[k..] {
                    *v /= -norm;
                }
                *qr.get_mut(k, k) += 1.0;

                let pivot = qr.get(k, k);
                for j in (k + 1)..n {
                    let s: f64 = qr.col(k)[k..]
                        .iter()
                        .zip(&qr.col(j)[k..])
                        .map(|(v, a)| v * a)
                        .sum();
                    let s = -s / pivot;
                    for i in k..m {
                        let v = qr.get(i, j) + s * qr.get(i, k);
                        qr.set(i, j, v);
                    }
                }
            }

            r_diag.push(norm);
        }

        Self { qr, r_diag }
    }

    /// The square `n × n` upper-triangular factor, `n = ncols(A)`.
    ///
    /// When A has fewer rows than columns the trailing rows are zero, which
    /// leaves `RᵀR = AᵀA` intact and keeps every contributor's block the
    /// same shape.
    pub fn r(&self) -> DMat {
        let n = self.qr.ncols();
        let k = self.r_diag.len();
        DMat::from_fn(n, n, |i, j| {
            if i >= k || j < i {
                0.0
            } else if i == j {
                self.r_diag[i]
            } else {
                self.qr.get(i, j)
            }
        })
    }
}
