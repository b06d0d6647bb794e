//! Dense linear algebra for lrsvm: DVec, DMat, and the three
//! decompositions the distributed solver needs.
//!
//! Everything here is local to one process. Matrices are column-major
//! `f64` and serializable, so the collective layer can ship them as-is.
//!
//! - [`Lu`] / [`inverse`]: LU with partial pivoting, inverse via a
//!   forward and a back triangular solve.
//! - [`Qr`]: Householder QR, exposing only the economy `R` factor.
//! - [`SymmetricEigen`]: cyclic Jacobi for small symmetric matrices.

mod dvec;
mod dmat;
mod lu;
mod qr;
mod eigen;

pub use dvec::DVec;
pub use dmat::DMat;
pub use lu::{inverse, Lu};
pub use qr::Qr;
pub use eigen::SymmetricEigen;
