//! Wire protocol types.
//!
//! Matrices travel as raw `f64` bit patterns. A replicated value must be
//! bit-identical on every rank, and a textual float encoding does not
//! guarantee that.

use lrsvm_la::DMat;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Protocol version. Incremented on breaking wire format changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// A dense matrix in wire format: column-major `f64::to_bits` values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMatrix {
    pub nrows: u32,
    pub ncols: u32,
    pub bits: Vec<u64>,
}

impl WireMatrix {
    pub fn from_dmat(m: &DMat) -> Self {
        Self {
            nrows: m.nrows() as u32,
            ncols: m.ncols() as u32,
            bits: m.as_slice().iter().map(|x| x.to_bits()).collect(),
        }
    }

    /// Convert back, rejecting a payload whose length disagrees with the shape.
    pub fn into_dmat(self) -> Result<DMat, MeshError> {
        let (nrows, ncols) = (self.nrows as usize, self.ncols as usize);
        if self.bits.len() != nrows * ncols {
            return Err(MeshError::MalformedMatrix {
                nrows: self.nrows,
                ncols: self.ncols,
                len: self.bits.len(),
            });
        }
        let data = self.bits.into_iter().map(f64::from_bits).collect();
        Ok(DMat::from_raw(nrows, ncols, data))
    }
}

/// The coordinator's answer to a worker joining.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
    pub size: u32,
}
