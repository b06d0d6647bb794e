use core::ops::{Index, IndexMut, Sub};
use serde::{Deserialize, Serialize};

/// Heap-allocated vector of `f64`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DVec {
    data: Vec<f64>,
}

impl DVec {
    /// Create from raw data.
    #[inline]
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Create a zero vector of given length.
    pub fn zeros(n: usize) -> Self {
        Self { data: vec![0.0; n] }
    }

    /// Create from a function.
    pub fn from_fn(n: usize, f: impl Fn(usize) -> f64) -> Self {
        Self { data: (0..n).map(f).collect() }
    }

    /// Create from a slice.
    pub fn from_slice(s: &[f64]) -> Self {
        Self { data: s.to_vec() }
    }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    #[inline]
    pub fn as_slice(&self) -> &[f64] { &self.data }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] { &mut self.data }

    #[inline]
    pub fn into_vec(self) -> Vec<f64> { self.data }

    /// Dot product.
    pub fn dot(&self, other: &DVec) -> f64 {
        assert_eq!(self.len(), other.len(), "DVec dot: length mismatch");
        self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum()
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Iterator over elements.
    pub fn iter(&self) -> core::slice::Iter<'_, f64> {
        self.data.iter()
    }
}

impl Index<usize> for DVec {
    type Output = f64;
    #[inline]
    fn index(&self, i: usize) -> &f64 { &self.data[i] }
}

impl IndexMut<usize> for DVec {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 { &mut self.data[i] }
}

impl Sub for &DVec {
    type Output = DVec;
    fn sub(self, rhs: &DVec) -> DVec {
        assert_eq!(self.len(), rhs.len());
        DVec::from_fn(self.len(), |i| self[i] - rhs[i])
    }
}
