//! Coordinator-side rendezvous state.
//!
//! A `RoundTable` holds, per round, the blocks gathered so far (the inbox)
//! and the value being broadcast together with how many workers still have
//! to fetch it (the outbox). Workers drive it through RPC handlers; the
//! coordinator drives it directly.
//!
//! The lock is a plain `std::sync::Mutex` and is never held across an
//! `.await`. Waiters use `Notify` with `enable()` before re-checking, so a
//! notification between the check and the await is not lost.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lrsvm_la::DMat;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::MeshError;

struct Published {
    value: DMat,
    remaining: usize,
}

#[derive(Default)]
struct Tables {
    inbox: HashMap<u64, Vec<Option<DMat>>>,
    outbox: HashMap<u64, Published>,
    links: usize,
}

/// Per-round mailbox shared by the coordinator and its RPC handlers.
pub struct RoundTable {
    size: usize,
    tables: Mutex<Tables>,
    arrived: Notify,
    published: Notify,
    unlinked: Notify,
}

impl RoundTable {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            tables: Mutex::new(Tables::default()),
            arrived: Notify::new(),
            published: Notify::new(),
            unlinked: Notify::new(),
        }
    }

    /// Number of ranks in the mesh.
    pub fn size(&self) -> usize {
        self.size
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `rank`'s block for `round`.
    pub fn deposit(&self, round: u64, rank: usize, block: DMat) -> Result<(), MeshError> {
        if rank >= self.size {
            return Err(MeshError::RankOutOfRange { rank, size: self.size });
        }
        {
            let mut tables = self.lock();
            let slots = tables.inbox.entry(round).or_insert_with(|| vec![None; self.size]);
            if slots[rank].is_some() {
                return Err(MeshError::DuplicateContribution { round, rank });
            }
            slots[rank] = Some(block);
        }
        debug!(round, rank, "block deposited");
        self.arrived.notify_waiters();
        Ok(())
    }

    fn take_complete(&self, round: u64) -> Option<Vec<DMat>> {
        let mut tables = self.lock();
        let complete = tables
            .inbox
            .get(&round)
            .is_some_and(|slots| slots.iter().all(Option::is_some));
        if !complete {
            return None;
        }
        tables
            .inbox
            .remove(&round)
            .map(|slots| slots.into_iter().flatten().collect())
    }

    /// Wait until every rank has deposited for `round`, then hand the blocks
    /// over in rank order.
    pub async fn collect(&self, round: u64) -> Vec<DMat> {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(blocks) = self.take_complete(round) {
                return blocks;
            }
            notified.await;
        }
    }

    /// Make `value` available to the `size − 1` workers for `round`.
    pub fn publish(&self, round: u64, value: DMat) {
        let readers = self.size - 1;
        if readers == 0 {
            return;
        }
        self.lock().outbox.insert(round, Published { value, remaining: readers });
        self.published.notify_waiters();
    }

    fn try_take(&self, round: u64) -> Option<DMat> {
        let mut tables = self.lock();
        let entry = tables.outbox.get_mut(&round)?;
        entry.remaining -= 1;
        if entry.remaining == 0 {
            tables.outbox.remove(&round).map(|p| p.value)
        } else {
            Some(entry.value.clone())
        }
    }

    /// Wait for the value published for `round`. Each worker takes it once;
    /// the entry is dropped after the last reader.
    pub async fn take(&self, round: u64) -> DMat {
        loop {
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = self.try_take(round) {
                return value;
            }
            notified.await;
        }
    }

    /// A worker connection started being served.
    pub fn link(&self) {
        self.lock().links += 1;
    }

    /// A worker connection closed.
    pub fn unlink(&self) {
        {
            let mut tables = self.lock();
            tables.links = tables.links.saturating_sub(1);
        }
        self.unlinked.notify_waiters();
    }

    /// Wait until every worker connection has closed.
    pub async fn until_unlinked(&self) {
        loop {
            let notified = self.unlinked.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().links == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Rounds with undelivered state, for diagnostics.
    pub fn pending(&self) -> (usize, usize) {
        let tables = self.lock();
        (tables.inbox.len(), tables.outbox.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn collect_waits_for_every_rank() {
        let table = Arc::new(RoundTable::new(3));
        table.deposit(0, 2, DMat::scalar(2.0)).unwrap();

        let t = table.clone();
        let waiter = tokio::spawn(async move { t.collect(0).await });

        table.deposit(0, 0, DMat::scalar(0.0)).unwrap();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        table.deposit(0, 1, DMat::scalar(1.0)).unwrap();
        let blocks = waiter.await.unwrap();
        let values: Vec<f64> = blocks.iter().map(|b| b.get(0, 0)).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0]);
        assert_eq!(table.pending(), (0, 0));
    }

    #[tokio::test]
    async fn rounds_do_not_mix() {
        let table = RoundTable::new(2);
        table.deposit(5, 1, DMat::scalar(51.0)).unwrap();
        table.deposit(4, 1, DMat::scalar(41.0)).unwrap();
        table.deposit(4, 0, DMat::scalar(40.0)).unwrap();
        let blocks = table.collect(4).await;
        assert_eq!(blocks[1].get(0, 0), 41.0);
        assert_eq!(table.pending(), (1, 0));
    }

    #[tokio::test]
    async fn published_value_dropped_after_last_reader() {
        let table = Arc::new(RoundTable::new(3));
        let t = table.clone();
        let early = tokio::spawn(async move { t.take(7).await });

        table.publish(7, DMat::scalar(3.5));
        assert_eq!(early.await.unwrap().get(0, 0), 3.5);
        assert_eq!(table.pending(), (0, 1));
        assert_eq!(table.take(7).await.get(0, 0), 3.5);
        assert_eq!(table.pending(), (0, 0));
    }

    #[test]
    fn duplicate_and_out_of_range_rejected() {
        let table = RoundTable::new(2);
        table.deposit(0, 1, DMat::scalar(1.0)).unwrap();
        assert!(matches!(
            table.deposit(0, 1, DMat::scalar(1.0)),
            Err(MeshError::DuplicateContribution { round: 0, rank: 1 })
        ));
        assert!(matches!(
            table.deposit(0, 2, DMat::scalar(1.0)),
            Err(MeshError::RankOutOfRange { rank: 2, size: 2 })
        ));
    }

    #[tokio::test]
    async fn unlinked_when_all_links_close() {
        let table = Arc::new(RoundTable::new(3));
        table.link();
        table.link();
        let t = table.clone();
        let waiter = tokio::spawn(async move { t.until_unlinked().await });
        table.unlink();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        table.unlink();
        waiter.await.unwrap();
    }
}
