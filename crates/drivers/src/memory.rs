//! In-process reference adapter.
//!
//! A shared key-value store with per-connection write buffering: reads see
//! the committed state (plus the connection's own buffer), writes apply
//! atomically at commit. That gives read-committed-like behavior -- no
//! dirty reads, but non-repeatable reads, lost updates and phantoms all
//! occur under concurrency, which is exactly what a checker's reference
//! target should exhibit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use adya_core::history::types::Outcome;
use adya_core::IsolationLevel;
use adya_testgen::PlannedOp;

use crate::{DbAdapter, Observed};

type Store = Arc<Mutex<BTreeMap<u64, u64>>>;

/// The shared state of an in-process cluster.
#[derive(Debug, Default, Clone)]
pub struct MemoryCluster {
    store: Store,
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens one connection.
    #[must_use]
    pub fn connect(&self) -> MemoryAdapter {
        MemoryAdapter {
            store: Arc::clone(&self.store),
            buffer: BTreeMap::new(),
        }
    }

    /// Opens `n` connections.
    #[must_use]
    pub fn connections(&self, n: usize) -> Vec<MemoryAdapter> {
        (0..n).map(|_| self.connect()).collect()
    }
}

/// One connection to a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemoryAdapter {
    store: Store,
    buffer: BTreeMap<u64, u64>,
}

/// The in-memory adapter cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {}

impl MemoryAdapter {
    fn store(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, u64>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed state overlaid with the connection's own buffer.
    fn snapshot(&self) -> BTreeMap<u64, u64> {
        let mut merged = self.store().clone();
        for (&object, &value) in &self.buffer {
            merged.insert(object, value);
        }
        merged
    }
}

impl DbAdapter for MemoryAdapter {
    type Error = MemoryError;

    fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), Self::Error> {
        // The store offers one behavior regardless of the requested level.
        self.buffer.clear();
        Ok(())
    }

    fn execute(&mut self, op: &PlannedOp) -> Result<Observed, Self::Error> {
        match op {
            PlannedOp::Read { object } => {
                let value = self
                    .buffer
                    .get(object)
                    .copied()
                    .or_else(|| self.store().get(object).copied());
                Ok(Observed::Row(value))
            }
            PlannedOp::Write { object, value } => {
                self.buffer.insert(*object, *value);
                Ok(Observed::Done)
            }
            PlannedOp::PredicateRead { predicate } => {
                let rows: Vec<(u64, u64)> = self
                    .snapshot()
                    .into_iter()
                    .filter(|(_, value)| predicate.matches(value))
                    .collect();
                Ok(Observed::Rows(rows))
            }
            PlannedOp::PredicateWrite { predicate, value } => {
                let matched: Vec<u64> = self
                    .snapshot()
                    .into_iter()
                    .filter(|(_, v)| predicate.matches(v))
                    .map(|(object, _)| object)
                    .collect();
                for &object in &matched {
                    self.buffer.insert(object, *value);
                }
                Ok(Observed::Updated(matched))
            }
        }
    }

    fn commit(&mut self) -> Result<Outcome, Self::Error> {
        let buffer = std::mem::take(&mut self.buffer);
        self.store().extend(buffer);
        Ok(Outcome::Committed)
    }

    fn rollback(&mut self) -> Result<(), Self::Error> {
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adya_core::history::types::Predicate;

    fn read(adapter: &mut MemoryAdapter, object: u64) -> Option<u64> {
        match adapter.execute(&PlannedOp::Read { object }).unwrap() {
            Observed::Row(value) => value,
            other => panic!("unexpected observation {other:?}"),
        }
    }

    #[test]
    fn buffered_writes_are_invisible_until_commit() {
        let cluster = MemoryCluster::new();
        let mut writer = cluster.connect();
        let mut reader = cluster.connect();

        writer.begin(IsolationLevel::ReadCommitted).unwrap();
        reader.begin(IsolationLevel::ReadCommitted).unwrap();
        writer
            .execute(&PlannedOp::Write { object: 1, value: 7 })
            .unwrap();

        assert_eq!(read(&mut reader, 1), None, "no dirty reads");
        assert_eq!(read(&mut writer, 1), Some(7), "reads own writes");

        assert_eq!(writer.commit().unwrap(), Outcome::Committed);
        assert_eq!(read(&mut reader, 1), Some(7), "committed state visible");
    }

    #[test]
    fn rollback_discards_the_buffer() {
        let cluster = MemoryCluster::new();
        let mut conn = cluster.connect();
        conn.begin(IsolationLevel::ReadCommitted).unwrap();
        conn.execute(&PlannedOp::Write { object: 1, value: 7 })
            .unwrap();
        conn.rollback().unwrap();
        conn.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(read(&mut conn, 1), None);
    }

    #[test]
    fn lost_updates_occur_under_concurrency() {
        // Two read-modify-write transactions interleave: both read 0, both
        // install their increment, the first commit is lost.
        let cluster = MemoryCluster::new();
        let mut init = cluster.connect();
        init.begin(IsolationLevel::ReadCommitted).unwrap();
        init.execute(&PlannedOp::Write { object: 1, value: 0 })
            .unwrap();
        init.commit().unwrap();

        let mut a = cluster.connect();
        let mut b = cluster.connect();
        a.begin(IsolationLevel::ReadCommitted).unwrap();
        b.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(read(&mut a, 1), Some(0));
        assert_eq!(read(&mut b, 1), Some(0));
        a.execute(&PlannedOp::Write { object: 1, value: 1 }).unwrap();
        b.execute(&PlannedOp::Write { object: 1, value: 2 }).unwrap();
        a.commit().unwrap();
        b.commit().unwrap();

        let mut check = cluster.connect();
        check.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(read(&mut check, 1), Some(2), "b overwrote a's update");
    }

    #[test]
    fn predicate_ops_see_the_overlay() {
        let cluster = MemoryCluster::new();
        let mut conn = cluster.connect();
        conn.begin(IsolationLevel::ReadCommitted).unwrap();
        conn.execute(&PlannedOp::Write { object: 1, value: 40 })
            .unwrap();
        conn.execute(&PlannedOp::Write { object: 2, value: 10 })
            .unwrap();

        let rows = conn
            .execute(&PlannedOp::PredicateRead {
                predicate: Predicate::GreaterThan(30),
            })
            .unwrap();
        assert_eq!(rows, Observed::Rows(vec![(1, 40)]));

        let updated = conn
            .execute(&PlannedOp::PredicateWrite {
                predicate: Predicate::GreaterThan(30),
                value: 99,
            })
            .unwrap();
        assert_eq!(updated, Observed::Updated(vec![1]));
        assert_eq!(read(&mut conn, 1), Some(99));
    }
}
