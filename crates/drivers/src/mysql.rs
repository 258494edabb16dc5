//! `MySQL` driver (also covers `MySQL`-compatible engines).

use adya_core::history::types::Outcome;
use adya_core::IsolationLevel;
use adya_testgen::PlannedOp;

use crate::{ClusterConfig, DbAdapter, Observed};

/// Adapter for `MySQL`-protocol databases.
pub struct MySqlAdapter {
    _config: ClusterConfig,
}

/// Errors from the `MySQL` adapter.
#[derive(Debug)]
pub enum MySqlError {
    /// Failed to connect to the cluster.
    Connection(String),
    /// Statement execution failed.
    Execution(String),
}

impl MySqlAdapter {
    /// Connects one adapter to the cluster.
    ///
    /// # Errors
    ///
    /// The wire protocol is not implemented yet; this always fails.
    pub fn connect(_config: &ClusterConfig) -> Result<Self, MySqlError> {
        Err(MySqlError::Connection(String::from(
            "MySQL driver not yet implemented",
        )))
    }
}

impl DbAdapter for MySqlAdapter {
    type Error = MySqlError;

    fn begin(&mut self, _isolation: IsolationLevel) -> Result<(), Self::Error> {
        Err(MySqlError::Execution(String::from(
            "MySQL driver not yet implemented",
        )))
    }

    fn execute(&mut self, _op: &PlannedOp) -> Result<Observed, Self::Error> {
        Err(MySqlError::Execution(String::from(
            "MySQL driver not yet implemented",
        )))
    }

    fn commit(&mut self) -> Result<Outcome, Self::Error> {
        Err(MySqlError::Execution(String::from(
            "MySQL driver not yet implemented",
        )))
    }

    fn rollback(&mut self) -> Result<(), Self::Error> {
        Err(MySqlError::Execution(String::from(
            "MySQL driver not yet implemented",
        )))
    }
}
