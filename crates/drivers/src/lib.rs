//! Database adapters and the concurrent workload executor.
//!
//! An adapter translates planned operations into a concrete database's
//! interface and reports outcomes truthfully; the executor dispatches a
//! planned workload over several adapters in parallel and records the
//! observed history. A nemesis can disturb the system while the workload
//! runs; its effects are visible only through the history.

pub mod executor;
pub mod memory;
pub mod mysql;
pub mod postgres;

use core::fmt::Debug;

use adya_core::history::types::Outcome;
use adya_core::IsolationLevel;
use adya_testgen::PlannedOp;

pub use executor::{execute, ExecError};
pub use memory::{MemoryAdapter, MemoryCluster};

/// Configuration for connecting to a database cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// `host:port` entries of the cluster nodes.
    pub nodes: Vec<String>,
    /// Number of connections to spread across the nodes.
    pub connections: usize,
}

/// What one operation observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// Writes return nothing.
    Done,
    /// Point read: the row's value, or `None` when the row does not exist.
    Row(Option<u64>),
    /// Predicate read: the matching rows, as (object, value) pairs.
    Rows(Vec<(u64, u64)>),
    /// Predicate write: the rows the database reported touching.
    Updated(Vec<u64>),
}

/// A connection capable of executing planned operations transactionally.
///
/// Implementations must report per-transaction outcomes truthfully:
/// [`Outcome::Unknown`] when the fate of a commit cannot be determined
/// (e.g. the connection died after sending it).
pub trait DbAdapter {
    type Error: Debug;

    /// Starts a transaction at the given isolation level.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<(), Self::Error>;

    /// Executes one operation inside the current transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails; the executor then rolls
    /// the transaction back.
    fn execute(&mut self, op: &PlannedOp) -> Result<Observed, Self::Error>;

    /// Commits the current transaction and reports its fate.
    ///
    /// # Errors
    ///
    /// Returns an error only when not even [`Outcome::Unknown`] can be
    /// reported (e.g. no transaction is open).
    fn commit(&mut self) -> Result<Outcome, Self::Error>;

    /// Rolls the current transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error when the rollback was not acknowledged; the
    /// transaction's fate is then unknown.
    fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Releases the connection.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// A fault injector. `inject` runs in a loop on its own thread while the
/// workload executes; `heal` runs once after the workers drain, and must
/// leave the system inspectable.
pub trait Nemesis {
    fn inject(&mut self);
    fn heal(&mut self);
}

/// The nemesis that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNemesis;

impl Nemesis for NoopNemesis {
    fn inject(&mut self) {
        // Nothing to disturb; yield so the loop does not spin hot.
        std::thread::yield_now();
    }

    fn heal(&mut self) {}
}
