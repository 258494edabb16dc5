//! Immutable history model with the query surface the analysis needs.
//!
//! A [`History`] is validated once at construction and never mutated. All
//! indexes (which operations wrote or read each object) are built up front,
//! so downstream passes only ever follow handles.

pub mod error;
pub mod types;

use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

use self::error::HistoryError;
use self::types::{OpId, Operation, Outcome, ReadRef, Transaction, TxnId};

/// A validated, immutable record of a workload run.
///
/// Transactions are held in ascending id order. A `PredicateWrite` counts as
/// one write per row it updated; a `PredicateRead` counts as one read per row
/// it returned.
#[derive(Debug, Clone)]
pub struct History<Variable, Value> {
    transactions: Vec<Transaction<Variable, Value>>,
    by_id: HashMap<TxnId, usize>,
    writes: HashMap<Variable, Vec<OpId>>,
    reads: HashMap<Variable, Vec<ReadRef>>,
}

impl<Variable, Value> History<Variable, Value>
where
    Variable: Eq + Hash + Clone + Ord,
{
    /// Builds and validates a history.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] when transaction ids collide, a sequence
    /// number repeats within a transaction, or operations are out of order.
    pub fn new(mut transactions: Vec<Transaction<Variable, Value>>) -> Result<Self, HistoryError> {
        transactions.sort_by_key(|txn| txn.id);

        let mut by_id = HashMap::with_capacity(transactions.len());
        for (index, txn) in transactions.iter().enumerate() {
            if by_id.insert(txn.id, index).is_some() {
                return Err(HistoryError::DuplicateTransaction { id: txn.id });
            }
            let mut seen = HashSet::with_capacity(txn.ops.len());
            let mut prev = None;
            for seq_op in &txn.ops {
                if !seen.insert(seq_op.seq) {
                    return Err(HistoryError::DuplicateSequence {
                        op: OpId {
                            txn: txn.id,
                            seq: seq_op.seq,
                        },
                    });
                }
                if prev.is_some_and(|p| seq_op.seq < p) {
                    return Err(HistoryError::UnorderedOperations { txn: txn.id });
                }
                prev = Some(seq_op.seq);
            }
        }

        let mut writes: HashMap<Variable, Vec<OpId>> = HashMap::new();
        let mut reads: HashMap<Variable, Vec<ReadRef>> = HashMap::new();
        for txn in &transactions {
            for seq_op in &txn.ops {
                let op_id = OpId {
                    txn: txn.id,
                    seq: seq_op.seq,
                };
                match &seq_op.op {
                    Operation::Read { object, .. } => {
                        reads.entry(object.clone()).or_default().push(ReadRef::item(op_id));
                    }
                    Operation::Write { object, .. } => {
                        writes.entry(object.clone()).or_default().push(op_id);
                    }
                    Operation::PredicateRead { observed, .. } => {
                        for (row, (object, _)) in (0..).zip(observed.iter()) {
                            reads
                                .entry(object.clone())
                                .or_default()
                                .push(ReadRef::row(op_id, row));
                        }
                    }
                    Operation::PredicateWrite { updated, .. } => {
                        for object in updated {
                            writes.entry(object.clone()).or_default().push(op_id);
                        }
                    }
                }
            }
        }

        Ok(Self {
            transactions,
            by_id,
            writes,
            reads,
        })
    }

    /// All transactions, ascending by id.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction<Variable, Value>> {
        self.transactions.iter()
    }

    /// Committed transactions, ascending by id.
    pub fn committed(&self) -> impl Iterator<Item = &Transaction<Variable, Value>> {
        self.transactions
            .iter()
            .filter(|txn| txn.outcome == Outcome::Committed)
    }

    /// Aborted transactions, ascending by id.
    pub fn aborted(&self) -> impl Iterator<Item = &Transaction<Variable, Value>> {
        self.transactions
            .iter()
            .filter(|txn| txn.outcome == Outcome::Aborted)
    }

    #[must_use]
    pub fn transaction(&self, id: TxnId) -> Option<&Transaction<Variable, Value>> {
        self.by_id.get(&id).map(|&index| &self.transactions[index])
    }

    #[must_use]
    pub fn outcome_of(&self, id: TxnId) -> Option<Outcome> {
        self.transaction(id).map(|txn| txn.outcome)
    }

    #[must_use]
    pub fn commit_stamp(&self, id: TxnId) -> Option<u64> {
        self.transaction(id).and_then(|txn| txn.commit_us)
    }

    /// The operation behind a handle, if the handle is valid.
    #[must_use]
    pub fn operation_at(&self, op: OpId) -> Option<&Operation<Variable, Value>> {
        let txn = self.transaction(op.txn)?;
        txn.ops
            .binary_search_by_key(&op.seq, |seq_op| seq_op.seq)
            .ok()
            .map(|index| &txn.ops[index].op)
    }

    /// Every write to `object` (point and predicate writes), in
    /// (transaction, sequence) order across the whole history.
    #[must_use]
    pub fn writes_of(&self, object: &Variable) -> &[OpId] {
        self.writes.get(object).map_or(&[], Vec::as_slice)
    }

    /// Every observation of `object` (item reads and predicate-read rows),
    /// in (transaction, sequence) order across the whole history.
    #[must_use]
    pub fn reads_of(&self, object: &Variable) -> &[ReadRef] {
        self.reads.get(object).map_or(&[], Vec::as_slice)
    }

    /// Every object mentioned by any read or write, ascending.
    #[must_use]
    pub fn objects(&self) -> Vec<&Variable> {
        let mut objects: Vec<&Variable> = self.writes.keys().chain(self.reads.keys()).collect();
        objects.sort_unstable();
        objects.dedup();
        objects
    }

    /// The object and observed value behind a read handle.
    #[must_use]
    pub fn observation(&self, read: ReadRef) -> Option<(&Variable, Option<&Value>)> {
        match (self.operation_at(read.op)?, read.row) {
            (Operation::Read { object, observed }, None) => Some((object, observed.as_ref())),
            (Operation::PredicateRead { observed, .. }, Some(row)) => observed
                .get(row as usize)
                .map(|(object, value)| (object, Some(value))),
            _ => None,
        }
    }

    /// The value a write handle installed into `object`, if it wrote one.
    #[must_use]
    pub fn written_value(&self, op: OpId, object: &Variable) -> Option<&Value> {
        self.operation_at(op)?.written_value(object)
    }

    /// The last write of `txn` to `object`, i.e. the version `txn` installs
    /// if it commits.
    #[must_use]
    pub fn final_write_of(&self, txn: TxnId, object: &Variable) -> Option<OpId> {
        self.writes_of(object)
            .iter()
            .rev()
            .find(|op| op.txn == txn)
            .copied()
    }

    /// Whether `op` is the last write of its transaction to `object`.
    #[must_use]
    pub fn is_final_write(&self, op: OpId, object: &Variable) -> bool {
        self.final_write_of(op.txn, object) == Some(op)
    }
}

#[cfg(feature = "serde")]
impl<Variable, Value> ::serde::Serialize for History<Variable, Value>
where
    Variable: ::serde::Serialize,
    Value: ::serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ::serde::Serializer,
    {
        // The indexes are derived; the transaction list is the history.
        self.transactions.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, Variable, Value> ::serde::Deserialize<'de> for History<Variable, Value>
where
    Variable: ::serde::Deserialize<'de> + Eq + Hash + Clone + Ord,
    Value: ::serde::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: ::serde::Deserializer<'de>,
    {
        let transactions = Vec::<Transaction<Variable, Value>>::deserialize(deserializer)?;
        Self::new(transactions).map_err(<D::Error as ::serde::de::Error>::custom)
    }
}
