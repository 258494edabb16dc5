//! The record of a run: transactions, operations and their observations.
//!
//! Everything here is data captured by the workload executor. Reads carry the
//! value they observed (or `None` for an absent row); predicate reads carry
//! the full row set they returned; predicate writes carry the rows the
//! database reported touching. The analysis never needs anything else.

use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

/// Opaque transaction handle. Ordering is by raw id; the id space is chosen
/// by the recorder (the generator hands out ids in dispatch order, with the
/// initial bracket transaction holding the smallest id).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl Display for TxnId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Opaque operation handle: a transaction plus the operation's sequence
/// number within it.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId {
    pub txn: TxnId,
    pub seq: u32,
}

impl Display for OpId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.txn, self.seq)
    }
}

/// Addresses a single observation: either an item read, or one returned row
/// of a predicate read (`row` is the index into the returned row set).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadRef {
    pub op: OpId,
    pub row: Option<u32>,
}

impl ReadRef {
    #[must_use]
    pub const fn item(op: OpId) -> Self {
        Self { op, row: None }
    }

    #[must_use]
    pub const fn row(op: OpId, row: u32) -> Self {
        Self { op, row: Some(row) }
    }
}

/// Terminal state of a transaction as reported by the adapter.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The commit was acknowledged.
    Committed,
    /// The rollback was acknowledged, or the error implies an abort.
    Aborted,
    /// No guarantee either way (e.g. the connection died mid-commit).
    Unknown,
}

/// Row predicate, evaluated against a row's value.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate<Value> {
    GreaterThan(Value),
    LessThan(Value),
    Equals(Value),
}

impl<Value: Ord> Predicate<Value> {
    /// Whether a row holding `value` belongs to this predicate's match set.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::GreaterThan(bound) => value > bound,
            Self::LessThan(bound) => value < bound,
            Self::Equals(bound) => value == bound,
        }
    }
}

impl<Value: Display> Display for Predicate<Value> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::GreaterThan(bound) => write!(f, ">{bound}"),
            Self::LessThan(bound) => write!(f, "<{bound}"),
            Self::Equals(bound) => write!(f, "={bound}"),
        }
    }
}

/// A recorded operation together with what it observed.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<Variable, Value> {
    /// Point read. `observed` is `None` when the row did not exist.
    Read {
        object: Variable,
        observed: Option<Value>,
    },
    /// Point write installing `value`.
    Write { object: Variable, value: Value },
    /// Predicate read; `observed` is the returned row set, in return order.
    PredicateRead {
        predicate: Predicate<Value>,
        observed: Vec<(Variable, Value)>,
    },
    /// Predicate write installing `value` into every matching row;
    /// `updated` is the set of rows the database reported touching.
    PredicateWrite {
        predicate: Predicate<Value>,
        value: Value,
        updated: Vec<Variable>,
    },
}

impl<Variable, Value> Operation<Variable, Value> {
    #[must_use]
    pub const fn read(object: Variable, observed: Value) -> Self {
        Self::Read {
            object,
            observed: Some(observed),
        }
    }

    #[must_use]
    pub const fn read_absent(object: Variable) -> Self {
        Self::Read {
            object,
            observed: None,
        }
    }

    #[must_use]
    pub const fn write(object: Variable, value: Value) -> Self {
        Self::Write { object, value }
    }

    #[must_use]
    pub const fn predicate_read(
        predicate: Predicate<Value>,
        observed: Vec<(Variable, Value)>,
    ) -> Self {
        Self::PredicateRead {
            predicate,
            observed,
        }
    }

    #[must_use]
    pub const fn predicate_write(
        predicate: Predicate<Value>,
        value: Value,
        updated: Vec<Variable>,
    ) -> Self {
        Self::PredicateWrite {
            predicate,
            value,
            updated,
        }
    }

    /// The value this operation wrote to `object`, if it wrote one.
    #[must_use]
    pub fn written_value(&self, object: &Variable) -> Option<&Value>
    where
        Variable: Eq,
    {
        match self {
            Self::Write { object: o, value } if o == object => Some(value),
            Self::PredicateWrite { value, updated, .. } if updated.contains(object) => Some(value),
            _ => None,
        }
    }
}

impl<Variable: Display, Value: Display> Display for Operation<Variable, Value> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Read { object, observed } => {
                if let Some(value) = observed {
                    write!(f, "{object}=={value}")
                } else {
                    write!(f, "{object}==?")
                }
            }
            Self::Write { object, value } => write!(f, "{object}:={value}"),
            Self::PredicateRead {
                predicate,
                observed,
            } => {
                write!(f, "pr({predicate})==[")?;
                for (i, (object, value)) in observed.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{object}={value}")?;
                }
                write!(f, "]")
            }
            Self::PredicateWrite {
                predicate,
                value,
                updated,
            } => {
                write!(f, "pw({predicate}):={value}[")?;
                for (i, object) in updated.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{object}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An operation with its per-transaction sequence number.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqOp<Variable, Value> {
    pub seq: u32,
    pub op: Operation<Variable, Value>,
}

/// A recorded transaction: an ordered list of operations plus its terminal
/// outcome. Wall-clock stamps (microseconds, adapter-supplied) are optional
/// and used only for version-order selection, tie-breaking and rendering.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction<Variable, Value> {
    pub id: TxnId,
    pub ops: Vec<SeqOp<Variable, Value>>,
    pub outcome: Outcome,
    pub start_us: Option<u64>,
    pub commit_us: Option<u64>,
}

impl<Variable, Value> Transaction<Variable, Value> {
    fn with_outcome(id: u64, ops: Vec<Operation<Variable, Value>>, outcome: Outcome) -> Self {
        let ops = ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| SeqOp {
                seq: u32::try_from(i).unwrap_or(u32::MAX),
                op,
            })
            .collect();
        Self {
            id: TxnId(id),
            ops,
            outcome,
            start_us: None,
            commit_us: None,
        }
    }

    /// A committed transaction; sequence numbers are assigned in order.
    #[must_use]
    pub fn committed(id: u64, ops: Vec<Operation<Variable, Value>>) -> Self {
        Self::with_outcome(id, ops, Outcome::Committed)
    }

    /// An aborted transaction.
    #[must_use]
    pub fn aborted(id: u64, ops: Vec<Operation<Variable, Value>>) -> Self {
        Self::with_outcome(id, ops, Outcome::Aborted)
    }

    /// A transaction whose fate is unknown.
    #[must_use]
    pub fn unknown(id: u64, ops: Vec<Operation<Variable, Value>>) -> Self {
        Self::with_outcome(id, ops, Outcome::Unknown)
    }

    /// Attaches start/commit stamps (microseconds).
    #[must_use]
    pub const fn stamped(mut self, start_us: u64, commit_us: u64) -> Self {
        self.start_us = Some(start_us);
        self.commit_us = Some(commit_us);
        self
    }
}

impl<Variable: Display, Value: Display> Display for Transaction<Variable, Value> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: [", self.id)?;
        for (i, seq_op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", seq_op.op)?;
        }
        write!(f, "]")?;
        match self.outcome {
            Outcome::Committed => Ok(()),
            Outcome::Aborted => write!(f, "!"),
            Outcome::Unknown => write!(f, "?"),
        }
    }
}
