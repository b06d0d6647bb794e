//! Error types for lrsvm-mesh.

use std::fmt;

/// Errors that can occur in collective operations.
#[derive(Debug)]
pub enum MeshError {
    /// Socket-level failure (bind, accept, connect).
    Transport(String),
    /// RPC call failed.
    Rpc(String),
    /// The coordinator refused a request.
    Rejected(String),
    /// Protocol version mismatch.
    VersionMismatch { expected: u32, got: u32 },
    /// Participants disagree on the number of ranks.
    SizeMismatch { expected: usize, got: usize },
    /// Rank outside `0..size`.
    RankOutOfRange { rank: usize, size: usize },
    /// A mesh needs at least one participant.
    EmptyMesh,
    /// Blocks combined by a reduction do not share a shape.
    ShapeMismatch { expected: (usize, usize), got: (usize, usize) },
    /// A rank contributed twice to the same round.
    DuplicateContribution { round: u64, rank: usize },
    /// The coordinator reached a broadcast with nothing to send.
    NothingToBroadcast,
    /// A wire matrix whose payload does not match its shape.
    MalformedMatrix { nrows: u32, ncols: u32, len: usize },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected by coordinator: {msg}"),
            Self::VersionMismatch { expected, got } => {
                write!(f, "protocol version mismatch: expected {expected}, got {got}")
            }
            Self::SizeMismatch { expected, got } => {
                write!(f, "mesh size mismatch: expected {expected} ranks, coordinator has {got}")
            }
            Self::RankOutOfRange { rank, size } => {
                write!(f, "rank {rank} out of range for a mesh of {size}")
            }
            Self::EmptyMesh => write!(f, "a mesh needs at least one rank"),
            Self::ShapeMismatch { expected, got } => write!(
                f,
                "block shape mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
            Self::DuplicateContribution { round, rank } => {
                write!(f, "rank {rank} contributed twice to round {round}")
            }
            Self::NothingToBroadcast => write!(f, "coordinator has no value to broadcast"),
            Self::MalformedMatrix { nrows, ncols, len } => {
                write!(f, "malformed matrix: {nrows}x{ncols} with {len} elements")
            }
        }
    }
}

impl std::error::Error for MeshError {}

impl From<std::io::Error> for MeshError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tarpc::client::RpcError> for MeshError {
    fn from(e: tarpc::client::RpcError) -> Self {
        Self::Rpc(e.to_string())
    }
}
