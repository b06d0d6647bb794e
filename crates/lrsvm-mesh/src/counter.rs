//! Communication volume accounting.
//!
//! Volume is counted in scalars, not bytes, with the convention that a
//! collective moving an `m`-element block between the coordinator and each
//! of the other `P − 1` ranks costs `(P − 1)·m`. Callers charge explicitly
//! because not every collective counts: control values such as a
//! convergence error travel for free.

use serde::{Deserialize, Serialize};

/// Monotone counter of scalars moved, scoped to one trial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommCounter {
    peers: u64,
    scalars: u64,
}

impl CommCounter {
    /// A zeroed counter for a mesh of `size` ranks.
    pub fn new(size: usize) -> Self {
        Self { peers: size.saturating_sub(1) as u64, scalars: 0 }
    }

    /// Charge one collective that moves `elements` scalars per peer.
    pub fn charge(&mut self, elements: usize) {
        self.scalars += self.peers * elements as u64;
    }

    /// Scalars counted so far.
    #[inline]
    pub fn scalars(&self) -> u64 {
        self.scalars
    }

    pub fn reset(&mut self) {
        self.scalars = 0;
    }
}
