//! Reductions applied by the coordinator to gathered blocks.
//!
//! Star topology: every block is collected at rank 0 and combined there in
//! rank order, so the result is the same on every run regardless of the
//! order in which contributions arrived.

use lrsvm_la::DMat;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// How gathered blocks are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Element-wise sum. All blocks share one shape.
    Sum,
    /// Vertical concatenation in rank order. All blocks share `ncols`.
    Stack,
}

/// Combines one block per rank into a single matrix.
pub struct AllReduce {
    op: Reduction,
}

impl AllReduce {
    pub fn new(op: Reduction) -> Self {
        Self { op }
    }

    pub fn sum() -> Self {
        Self::new(Reduction::Sum)
    }

    pub fn stack() -> Self {
        Self::new(Reduction::Stack)
    }

    /// Reduce `blocks` (indexed by rank).
    pub fn reduce(&self, blocks: &[DMat]) -> Result<DMat, MeshError> {
        let Some(first) = blocks.first() else {
            return Ok(DMat::zeros(0, 0));
        };

        match self.op {
            Reduction::Sum => {
                let mut acc = first.clone();
                for b in &blocks[1..] {
                    if b.shape() != acc.shape() {
                        return Err(MeshError::ShapeMismatch { expected: acc.shape(), got: b.shape() });
                    }
                    for (a, x) in acc.as_mut_slice().iter_mut().zip(b.as_slice()) {
                        *a += x;
                    }
                }
                Ok(acc)
            }
            Reduction::Stack => {
                let ncols = first.ncols();
                if let Some(b) = blocks.iter().find(|b| b.ncols() != ncols) {
                    return Err(MeshError::ShapeMismatch {
                        expected: (b.nrows(), ncols),
                        got: b.shape(),
                    });
                }
                Ok(DMat::vstack(blocks))
            }
        }
    }
}
