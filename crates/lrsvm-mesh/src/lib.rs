//! lrsvm-mesh: synchronous collectives for SPMD training.
//!
//! P participants run identical code and meet at every collective. Rank 0,
//! the coordinator, hosts a [`RoundTable`](hub::RoundTable) behind the
//! `CollectiveService` RPC interface; workers reach it over tarpc, either
//! through in-process channels ([`Mesh::local`]) or TCP
//! ([`Communicator::listen_tcp`] / [`Communicator::connect_tcp`]).
//!
//! ```text
//!  Workers (rank 1..P)                 Coordinator (rank 0)
//! ┌──────────────┐  contribute(r, blk) ┌──────────────────┐
//! │ Communicator │ ──────────────────→ │ RoundTable       │
//! │              │  fetch(r)           │  inbox[r]: P×blk │
//! │              │ ←────────────────── │  outbox[r]: val  │
//! └──────────────┘                     └──────────────────┘
//! ```
//!
//! Every collective consumes one round number on every participant. Since
//! all participants issue the same sequence of collectives, round numbers
//! line up without any extra coordination.
//!
//! No timeouts and no failure detection: a participant that never reaches
//! a collective stalls the others.

pub mod allreduce;
pub mod communicator;
pub mod counter;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod topology;
pub mod transport;

pub use allreduce::{AllReduce, Reduction};
pub use communicator::{Communicator, Mesh};
pub use counter::CommCounter;
pub use error::MeshError;
pub use protocol::{Handshake, WireMatrix, PROTOCOL_VERSION};
pub use topology::{Role, Topology, COORDINATOR};
