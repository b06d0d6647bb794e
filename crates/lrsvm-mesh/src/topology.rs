//! Fixed process topology: this participant's rank and the mesh size.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Rank of the coordinator.
pub const COORDINATOR: usize = 0;

/// What a participant does at a collective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Rank 0: owns the combined state of every gather and the source of every broadcast.
    Coordinator,
    /// Any other rank.
    Worker,
}

/// Rank and size, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topology {
    rank: usize,
    size: usize,
}

impl Topology {
    pub fn new(rank: usize, size: usize) -> Result<Self, MeshError> {
        if size == 0 {
            return Err(MeshError::EmptyMesh);
        }
        if rank >= size {
            return Err(MeshError::RankOutOfRange { rank, size });
        }
        Ok(Self { rank, size })
    }

    /// A mesh of one: every collective is local.
    pub fn single() -> Self {
        Self { rank: COORDINATOR, size: 1 }
    }

    #[inline]
    pub fn rank(&self) -> usize { self.rank }

    #[inline]
    pub fn size(&self) -> usize { self.size }

    /// Number of participants other than this one.
    #[inline]
    pub fn peers(&self) -> usize { self.size - 1 }

    pub fn role(&self) -> Role {
        if self.rank == COORDINATOR {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.role() == Role::Coordinator
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank {}/{}", self.rank, self.size)
    }
}
