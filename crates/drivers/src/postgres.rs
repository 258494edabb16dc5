//! `PostgreSQL` driver (also covers wire-compatible engines).

use adya_core::history::types::Outcome;
use adya_core::IsolationLevel;
use adya_testgen::PlannedOp;

use crate::{ClusterConfig, DbAdapter, Observed};

/// Adapter for `PostgreSQL`-protocol databases.
pub struct PostgresAdapter {
    _config: ClusterConfig,
}

/// Errors from the `PostgreSQL` adapter.
#[derive(Debug)]
pub enum PostgresError {
    /// Failed to connect to the cluster.
    Connection(String),
    /// Statement execution failed.
    Execution(String),
}

impl PostgresAdapter {
    /// Connects one adapter to the cluster.
    ///
    /// # Errors
    ///
    /// The wire protocol is not implemented yet; this always fails.
    pub fn connect(_config: &ClusterConfig) -> Result<Self, PostgresError> {
        Err(PostgresError::Connection(String::from(
            "PostgreSQL driver not yet implemented",
        )))
    }
}

impl DbAdapter for PostgresAdapter {
    type Error = PostgresError;

    fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), Self::Error> {
        Err(PostgresError::Execution(String::from(
            "PostgreSQL driver not yet implemented",
        )))
    }

    fn execute(&mut self, _op: &PlannedOp) -> Result<Observed, Self::Error> {
        Err(PostgresError::Execution(String::from(
            "PostgreSQL driver not yet implemented",
        )))
    }

    fn commit(&mut self) -> Result<Outcome, Self::Error> {
        Err(PostgresError::Execution(String::from(
            "PostgreSQL driver not yet implemented",
        )))
    }

    fn rollback(&mut self) -> Result<(), Self::Error> {
        Err(PostgresError::Execution(String::from(
            "PostgreSQL driver not yet implemented",
        )))
    }
}
