use crate::{DMat, DVec};

/// Eigendecomposition of a symmetric matrix: A = V * diag(λ) * V^T
///
/// Cyclic Jacobi sweeps. The matrices decomposed here are rank-sized
/// Gram matrices, small enough that Jacobi's accuracy on tiny eigenvalues
/// matters more than its O(n³) per sweep.
pub struct SymmetricEigen {
    /// Eigenvalues, sorted ascending.
    pub eigenvalues: DVec,
    /// Eigenvectors as columns, in the order of `eigenvalues`.
    pub eigenvectors: DMat,
}

const MAX_SWEEPS: usize = 64;

impl SymmetricEigen {
    /// Compute eigendecomposition of a symmetric matrix.
    pub fn new(a: &DMat) -> Self {
        assert!(a.is_square(), "SymmetricEigen: matrix must be square");
        let n = a.nrows();
        let mut d = a.clone();
        let mut v = DMat::identity(n);

        let scale = a.norm().max(f64::MIN_POSITIVE);
        for _ in 0..MAX_SWEEPS {
            if off_diagonal_norm(&d) <= f64::EPSILON * scale {
                break;
            }
            for p in 0..n {
                for q in (p + 1)..n {
                    rotate(&mut d, &mut v, p, q);
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| d.get(i, i).total_cmp(&d.get(j, j)));

        let eigenvalues = DVec::from_fn(n, |i| d.get(order[i], order[i]));
        let eigenvectors = DMat::from_fn(n, n, |i, j| v.get(i, order[j]));

        Self { eigenvalues, eigenvectors }
    }
}

fn off_diagonal_norm(d: &DMat) -> f64 {
    let n = d.nrows();
    let mut s = 0.0;
    for j in 0..n {
        for i in 0..n {
            if i != j {
                s += d.get(i, j) * d.get(i, j);
            }
        }
    }
    s.sqrt()
}

/// One Jacobi rotation zeroing d[p][q], accumulated into v.
fn rotate(d: &mut DMat, v: &mut DMat, p: usize, q: usize) {
    let apq = d.get(p, q);
    if apq == 0.0 {
        return;
    }
    let n = d.nrows();
    let app = d.get(p, p);
    let aqq = d.get(q, q);

    let theta = (aqq - app) / (2.0 * apq);
    let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
    let c = (1.0 + t * t).sqrt().recip();
    let s = t * c;

    d.set(p, p, app - t * apq);
    d.set(q, q, aqq + t * apq);
    d.set(p, q, 0.0);
    d.set(q, p, 0.0);

    for i in 0..n {
        if i == p || i == q {
            continue;
        }
        let dip = d.get(i, p);
        let diq = d.get(i, q);
        let new_ip = c * dip - s * diq;
        let new_iq = s * dip + c * diq;
        d.set(i, p, new_ip);
        d.set(p, i, new_ip);
        d.set(i, q, new_iq);
        d.set(q, i, new_iq);
    }

    for i in 0..n {
        let vip = v.get(i, p);
        let viq = v.get(i, q);
        v.set(i, p, c * vip - s * viq);
        v.set(i, q, s * vip + c * viq);
    }
}
