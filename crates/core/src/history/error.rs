use core::fmt::{self, Display, Formatter};

use crate::history::types::{OpId, TxnId};

/// Error constructing a [`History`](crate::history::History) from recorded
/// transactions. These are malformed inputs, not anomalies: a well-behaved
/// recorder never produces them.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Two transactions carry the same identifier.
    DuplicateTransaction { id: TxnId },
    /// A sequence number appears twice within one transaction.
    DuplicateSequence { op: OpId },
    /// A transaction's operations are not in ascending sequence order.
    UnorderedOperations { txn: TxnId },
}

impl Display for HistoryError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::DuplicateTransaction { id } => {
                write!(f, "duplicate transaction id {id}")
            }
            Self::DuplicateSequence { op } => {
                write!(f, "duplicate operation sequence number {op}")
            }
            Self::UnorderedOperations { txn } => {
                write!(f, "operations of {txn} are not in sequence order")
            }
        }
    }
}
