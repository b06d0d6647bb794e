use crate::DVec;
use core::ops::{Add, Index, Mul, Neg, Sub};
use serde::{Deserialize, Serialize};

/// Heap-allocated column-major `f64` matrix.
///
/// Element (row, col) is stored at `data[col * nrows + row]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DMat {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl DMat {
    /// Create from raw column-major data.
    pub fn from_raw(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "DMat: data length mismatch");
        Self { data, nrows, ncols }
    }

    /// Create from row-major data (the order matrices are written in tests and files).
    pub fn from_row_slice(nrows: usize, ncols: usize, rows: &[f64]) -> Self {
        assert_eq!(rows.len(), nrows * ncols, "DMat: data length mismatch");
        Self::from_fn(nrows, ncols, |i, j| rows[i * ncols + j])
    }

    /// Create from a function.
    pub fn from_fn(nrows: usize, ncols: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Zero matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self { data: vec![0.0; nrows * ncols], nrows, ncols }
    }

    /// Matrix with every entry equal to `value`.
    pub fn filled(nrows: usize, ncols: usize, value: f64) -> Self {
        Self { data: vec![value; nrows * ncols], nrows, ncols }
    }

    /// Identity matrix.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Diagonal matrix from a vector.
    pub fn from_diagonal(diag: &DVec) -> Self {
        let n = diag.len();
        Self::from_fn(n, n, |i, j| if i == j { diag[i] } else { 0.0 })
    }

    /// Single-column matrix.
    pub fn column(values: &[f64]) -> Self {
        Self { data: values.to_vec(), nrows: values.len(), ncols: 1 }
    }

    /// 1×1 matrix, the wire shape of a scalar.
    pub fn scalar(value: f64) -> Self {
        Self { data: vec![value], nrows: 1, ncols: 1 }
    }

    #[inline]
    pub fn nrows(&self) -> usize { self.nrows }

    #[inline]
    pub fn ncols(&self) -> usize { self.ncols }

    /// `(nrows, ncols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) { (self.nrows, self.ncols) }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Element access (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.nrows + row]
    }

    /// Mutable element access.
    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.data[col * self.nrows + row]
    }

    /// Set element.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[col * self.nrows + row] = val;
    }

    /// Raw column-major data.
    #[inline]
    pub fn as_slice(&self) -> &[f64] { &self.data }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] { &mut self.data }

    #[inline]
    pub fn into_vec(self) -> Vec<f64> { self.data }

    /// Column slice.
    pub fn col(&self, j: usize) -> &[f64] {
        let start = j * self.nrows;
        &self.data[start..start + self.nrows]
    }

    /// Mutable column slice.
    pub fn col_mut(&mut self, j: usize) -> &mut [f64] {
        let start = j * self.nrows;
        &mut self.data[start..start + self.nrows]
    }

    /// Extract row as DVec.
    pub fn row_vec(&self, i: usize) -> DVec {
        DVec::from_fn(self.ncols, |j| self.get(i, j))
    }

    /// Transpose.
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncols, self.nrows, |i, j| self.get(j, i))
    }

    /// Matrix-vector product: y = A * x.
    pub fn mul_vec(&self, x: &DVec) -> DVec {
        assert_eq!(self.ncols, x.len(), "DMat mul_vec: dimension mismatch");
        let mut y = DVec::zeros(self.nrows);
        for j in 0..self.ncols {
            let xj = x[j];
            for (yi, &aij) in y.as_mut_slice().iter_mut().zip(self.col(j)) {
                *yi += aij * xj;
            }
        }
        y
    }

    /// Matrix-matrix product: C = A * B.
    pub fn mul_mat(&self, rhs: &DMat) -> DMat {
        assert_eq!(self.ncols, rhs.nrows, "DMat mul_mat: dimension mismatch");
        let mut c = DMat::zeros(self.nrows, rhs.ncols);
        for j in 0..rhs.ncols {
            for k in 0..self.ncols {
                let b_kj = rhs.get(k, j);
                if b_kj == 0.0 {
                    continue;
                }
                let a_col = self.col(k);
                for (c_ij, &a_ik) in c.col_mut(j).iter_mut().zip(a_col) {
                    *c_ij += a_ik * b_kj;
                }
            }
        }
        c
    }

    /// Transposed product: C = Aᵀ * B, without materializing Aᵀ.
    ///
    /// Each entry is a dot product of two columns, which keeps the
    /// tall-and-skinny `X̂ᵀ·Q` products cache friendly.
    pub fn tr_mul(&self, rhs: &DMat) -> DMat {
        assert_eq!(self.nrows, rhs.nrows, "DMat tr_mul: dimension mismatch");
        let mut c = DMat::zeros(self.ncols, rhs.ncols);
        for j in 0..rhs.ncols {
            let b_col = rhs.col(j);
            for i in 0..self.ncols {
                let dot: f64 = self.col(i).iter().zip(b_col).map(|(a, b)| a * b).sum();
                c.set(i, j, dot);
            }
        }
        c
    }

    /// Scale row `i` by `factors[i]`, i.e. `diag(factors) * A`.
    pub fn scale_rows(&self, factors: &DVec) -> DMat {
        assert_eq!(self.nrows, factors.len(), "DMat scale_rows: dimension mismatch");
        Self::from_fn(self.nrows, self.ncols, |i, j| self.get(i, j) * factors[i])
    }

    /// Append columns of `rhs` to the right: `[A, B]`.
    pub fn hstack(&self, rhs: &DMat) -> DMat {
        assert_eq!(self.nrows, rhs.nrows, "DMat hstack: row count mismatch");
        let mut data = Vec::with_capacity(self.data.len() + rhs.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&rhs.data);
        Self { data, nrows: self.nrows, ncols: self.ncols + rhs.ncols }
    }

    /// Stack blocks on top of each other. All blocks must share `ncols`.
    pub fn vstack(blocks: &[DMat]) -> DMat {
        let Some(first) = blocks.first() else {
            return DMat::zeros(0, 0);
        };
        let ncols = first.ncols;
        assert!(blocks.iter().all(|b| b.ncols == ncols), "DMat vstack: column count mismatch");
        let nrows: usize = blocks.iter().map(|b| b.nrows).sum();
        let mut out = DMat::zeros(nrows, ncols);
        for j in 0..ncols {
            let mut offset = 0;
            let dst = out.col_mut(j);
            for b in blocks {
                dst[offset..offset + b.nrows].copy_from_slice(b.col(j));
                offset += b.nrows;
            }
        }
        out
    }

    /// Rows `start..start + len` as a new matrix.
    pub fn rows(&self, start: usize, len: usize) -> DMat {
        assert!(start + len <= self.nrows, "DMat rows: range out of bounds");
        Self::from_fn(len, self.ncols, |i, j| self.get(start + i, j))
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> DMat {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            nrows: self.nrows,
            ncols: self.ncols,
        }
    }

    /// Frobenius norm squared.
    pub fn norm_sq(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Entrywise L1 norm. For a column vector this is the usual vector 1-norm.
    pub fn l1_norm(&self) -> f64 {
        self.data.iter().map(|x| x.abs()).sum()
    }

    /// Scale all elements.
    pub fn scale(&self, s: f64) -> Self {
        self.map(|x| x * s)
    }

    /// Whether every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Is this matrix square?
    #[inline]
    pub fn is_square(&self) -> bool { self.nrows == self.ncols }

    /// Swap two rows.
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b { return; }
        for j in 0..self.ncols {
            let base = j * self.nrows;
            self.data.swap(base + a, base + b);
        }
    }
}

impl Index<(usize, usize)> for DMat {
    type Output = f64;
    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[col * self.nrows + row]
    }
}

impl Add for &DMat {
    type Output = DMat;
    fn add(self, rhs: &DMat) -> DMat {
        assert_eq!(self.shape(), rhs.shape(), "DMat add: shape mismatch");
        DMat {
            data: self.data.iter().zip(&rhs.data).map(|(a, b)| a + b).collect(),
            nrows: self.nrows,
            ncols: self.ncols,
        }
    }
}

impl Sub for &DMat {
    type Output = DMat;
    fn sub(self, rhs: &DMat) -> DMat {
        assert_eq!(self.shape(), rhs.shape(), "DMat sub: shape mismatch");
        DMat {
            data: self.data.iter().zip(&rhs.data).map(|(a, b)| a - b).collect(),
            nrows: self.nrows,
            ncols: self.ncols,
        }
    }
}

impl Neg for &DMat {
    type Output = DMat;
    fn neg(self) -> DMat {
        self.map(|x| -x)
    }
}

impl Mul<&DVec> for &DMat {
    type Output = DVec;
    fn mul(self, rhs: &DVec) -> DVec { self.mul_vec(rhs) }
}

impl Mul for &DMat {
    type Output = DMat;
    fn mul(self, rhs: &DMat) -> DMat { self.mul_mat(rhs) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mul() {
        let i = DMat::identity(3);
        let x = DVec::from_slice(&[1.0, 2.0, 3.0]);
        let y = i.mul_vec(&x);
        assert_eq!(y.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn mat_mul() {
        let a = DMat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = DMat::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = a.mul_mat(&b);
        // [1 2 3] * [1 2]   = [22 28]
        // [4 5 6]   [3 4]     [49 64]
        //           [5 6]
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.get(0, 0), 22.0);
        assert_eq!(c.get(0, 1), 28.0);
        assert_eq!(c.get(1, 0), 49.0);
        assert_eq!(c.get(1, 1), 64.0);
    }

    #[test]
    fn tr_mul_matches_explicit_transpose() {
        let a = DMat::from_fn(5, 3, |i, j| (i as f64 - 2.0) * (j as f64 + 0.5));
        let b = DMat::from_fn(5, 2, |i, j| ((i + j) % 3) as f64 - 1.0);
        let fast = a.tr_mul(&b);
        let slow = a.transpose().mul_mat(&b);
        assert_eq!(fast.shape(), (3, 2));
        for i in 0..3 {
            for j in 0..2 {
                assert!((fast.get(i, j) - slow.get(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn transpose() {
        let m = DMat::from_fn(2, 3, |i, j| (i * 3 + j) as f64);
        let mt = m.transpose();
        assert_eq!(mt.shape(), (3, 2));
        assert_eq!(mt.get(0, 1), 3.0);
        assert_eq!(mt.get(1, 0), 1.0);
    }

    #[test]
    fn vstack_and_rows() {
        let a = DMat::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = DMat::from_row_slice(2, 2, &[3.0, 4.0, 5.0, 6.0]);
        let s = DMat::vstack(&[a.clone(), b.clone()]);
        assert_eq!(s.shape(), (3, 2));
        assert_eq!(s.get(2, 1), 6.0);
        assert_eq!(s.rows(0, 1), a);
        assert_eq!(s.rows(1, 2), b);
    }

    #[test]
    fn hstack_appends_columns() {
        let a = DMat::from_row_slice(2, 1, &[1.0, 2.0]);
        let ones = DMat::filled(2, 1, 1.0);
        let m = a.hstack(&ones);
        assert_eq!(m, DMat::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 1.0]));
    }

    #[test]
    fn scale_rows_by_labels() {
        let m = DMat::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let signs = DVec::from_slice(&[-1.0, 1.0]);
        assert_eq!(m.scale_rows(&signs), DMat::from_row_slice(2, 2, &[-1.0, -2.0, 3.0, 4.0]));
    }

    #[test]
    fn l1_norm_of_column() {
        let v = DMat::column(&[1.0, -2.0, 0.5]);
        assert_eq!(v.l1_norm(), 3.5);
    }
}
