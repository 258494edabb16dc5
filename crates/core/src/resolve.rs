//! Resolves every observation to the write that produced it.
//!
//! For each read (item reads and predicate-read rows alike) the resolver
//! names a [`ResolvedSource`]: the committed install it observed, the
//! reader's own earlier write, the pre-history state, or one of the
//! pathological sources that later passes turn into anomalies (aborted
//! writes, intermediate writes) or warnings (writes of unknown fate).
//!
//! Resolution is deterministic: when several committed writes carry the same
//! value, the latest-committing one at or before the reader's commit wins
//! (when stamps are available), otherwise the smallest transaction id.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use core::hash::Hash;

use crate::history::types::{OpId, Operation, Outcome, ReadRef, TxnId};
use crate::history::History;

/// Where an observed value came from.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource {
    /// The pre-history state: the row did not exist yet.
    Initial,
    /// An earlier write of the reading transaction itself.
    SelfWrite(OpId),
    /// The final write of a committed transaction.
    CommittedFinal(OpId),
    /// A non-final write of a committed transaction (G1b witness).
    CommittedIntermediate(OpId),
    /// A write of an aborted transaction (G1a witness).
    Aborted(OpId),
    /// Only a transaction of unknown fate could have produced the value,
    /// or nothing could.
    Unresolved,
}

/// A single resolved observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRead<Variable, Value> {
    pub object: Variable,
    pub observed: Option<Value>,
    pub source: ResolvedSource,
}

/// Input problems discovered during analysis. These do not abort the check;
/// the affected reads or objects are excluded and the report is flagged
/// incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError<Variable, Value> {
    /// A read observed a value no recorded write produced.
    UnmatchedRead {
        read: ReadRef,
        object: Variable,
        observed: Value,
    },
    /// The observed reads of an object admit no total version order.
    VersionOrderConflict {
        object: Variable,
        first: TxnId,
        second: TxnId,
    },
}

impl<Variable: Display, Value: Display> Display for IntegrityError<Variable, Value> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UnmatchedRead {
                read,
                object,
                observed,
            } => write!(
                f,
                "read {} observed {object}=={observed}, which no write produced",
                read.op
            ),
            Self::VersionOrderConflict {
                object,
                first,
                second,
            } => write!(
                f,
                "reads of {object} admit no version order ({first} and {second} conflict)"
            ),
        }
    }
}

/// The full resolution of a history.
#[derive(Debug, Clone)]
pub struct Resolution<Variable, Value> {
    /// Every observation, in handle order.
    pub reads: BTreeMap<ReadRef, ResolvedRead<Variable, Value>>,
    /// Reads that could only have come from a transaction of unknown fate.
    pub unresolved: Vec<ReadRef>,
    /// Reads no write can account for.
    pub errors: Vec<IntegrityError<Variable, Value>>,
}

/// Resolves every observation in `history`.
pub fn resolve<Variable, Value>(history: &History<Variable, Value>) -> Resolution<Variable, Value>
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let mut resolution = Resolution {
        reads: BTreeMap::new(),
        unresolved: Vec::new(),
        errors: Vec::new(),
    };

    for txn in history.transactions() {
        for seq_op in &txn.ops {
            let op_id = OpId {
                txn: txn.id,
                seq: seq_op.seq,
            };
            match &seq_op.op {
                Operation::Read { object, observed } => {
                    resolve_one(
                        history,
                        ReadRef::item(op_id),
                        object,
                        observed.as_ref(),
                        &mut resolution,
                    );
                }
                Operation::PredicateRead { observed, .. } => {
                    for (row, (object, value)) in (0..).zip(observed.iter()) {
                        resolve_one(
                            history,
                            ReadRef::row(op_id, row),
                            object,
                            Some(value),
                            &mut resolution,
                        );
                    }
                }
                Operation::Write { .. } | Operation::PredicateWrite { .. } => {}
            }
        }
    }

    tracing::debug!(
        reads = resolution.reads.len(),
        unresolved = resolution.unresolved.len(),
        errors = resolution.errors.len(),
        "resolved history"
    );

    resolution
}

fn resolve_one<Variable, Value>(
    history: &History<Variable, Value>,
    read: ReadRef,
    object: &Variable,
    observed: Option<&Value>,
    resolution: &mut Resolution<Variable, Value>,
) where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let source = match observed {
        None => ResolvedSource::Initial,
        Some(value) => {
            let source = locate_source(history, read, object, value);
            if source == ResolvedSource::Unresolved {
                let matched_unknown = history.writes_of(object).iter().any(|&w| {
                    history.written_value(w, object) == Some(value)
                        && history.outcome_of(w.txn) == Some(Outcome::Unknown)
                });
                if matched_unknown {
                    resolution.unresolved.push(read);
                } else {
                    resolution.errors.push(IntegrityError::UnmatchedRead {
                        read,
                        object: object.clone(),
                        observed: value.clone(),
                    });
                }
            }
            source
        }
    };

    resolution.reads.insert(
        read,
        ResolvedRead {
            object: object.clone(),
            observed: observed.cloned(),
            source,
        },
    );
}

fn locate_source<Variable, Value>(
    history: &History<Variable, Value>,
    read: ReadRef,
    object: &Variable,
    value: &Value,
) -> ResolvedSource
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let reader = read.op.txn;
    let matching: Vec<OpId> = history
        .writes_of(object)
        .iter()
        .copied()
        .filter(|&w| history.written_value(w, object) == Some(value))
        .collect();

    let committed_final: Vec<OpId> = matching
        .iter()
        .copied()
        .filter(|&w| {
            w.txn != reader
                && history.outcome_of(w.txn) == Some(Outcome::Committed)
                && history.is_final_write(w, object)
        })
        .collect();
    if !committed_final.is_empty() {
        return ResolvedSource::CommittedFinal(pick_committed(history, reader, &committed_final));
    }

    if let Some(own) = matching
        .iter()
        .copied()
        .filter(|w| w.txn == reader && w.seq < read.op.seq)
        .last()
    {
        return ResolvedSource::SelfWrite(own);
    }

    if let Some(&aborted) = matching
        .iter()
        .find(|w| w.txn != reader && history.outcome_of(w.txn) == Some(Outcome::Aborted))
    {
        return ResolvedSource::Aborted(aborted);
    }

    if let Some(&intermediate) = matching.iter().find(|&&w| {
        w.txn != reader
            && history.outcome_of(w.txn) == Some(Outcome::Committed)
            && !history.is_final_write(w, object)
    }) {
        return ResolvedSource::CommittedIntermediate(intermediate);
    }

    ResolvedSource::Unresolved
}

/// Deterministic choice among committed final writes carrying the same value:
/// with stamps, the latest-committing write at or before the reader's commit;
/// otherwise the smallest transaction id.
fn pick_committed<Variable, Value>(
    history: &History<Variable, Value>,
    reader: TxnId,
    candidates: &[OpId],
) -> OpId
where
    Variable: Eq + Hash + Clone + Ord,
{
    debug_assert!(!candidates.is_empty());

    if let Some(reader_commit) = history.commit_stamp(reader) {
        let mut best: Option<(u64, OpId)> = None;
        for &w in candidates {
            let Some(stamp) = history.commit_stamp(w.txn) else {
                continue;
            };
            if stamp > reader_commit {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_stamp, best_op)) => {
                    stamp > best_stamp || (stamp == best_stamp && w.txn < best_op.txn)
                }
            };
            if better {
                best = Some((stamp, w));
            }
        }
        if let Some((_, w)) = best {
            return w;
        }
    }

    candidates
        .iter()
        .copied()
        .min_by_key(|w| w.txn)
        .unwrap_or(candidates[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::{Operation, Transaction};

    fn read_ref_of(txn: u64, seq: u32) -> ReadRef {
        ReadRef::item(OpId {
            txn: TxnId(txn),
            seq,
        })
    }

    #[test]
    fn committed_final_write_wins() {
        let h = History::new(vec![
            Transaction::committed(1, vec![Operation::write("x", 7)]),
            Transaction::committed(2, vec![Operation::read("x", 7)]),
        ])
        .unwrap();
        let r = resolve(&h);
        let source = r.reads[&read_ref_of(2, 0)].source;
        assert_eq!(
            source,
            ResolvedSource::CommittedFinal(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn own_write_preferred_over_nothing() {
        let h = History::new(vec![Transaction::committed(
            1,
            vec![Operation::write("x", 7), Operation::read("x", 7)],
        )])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(
            r.reads[&read_ref_of(1, 1)].source,
            ResolvedSource::SelfWrite(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn absent_row_resolves_to_initial() {
        let h: History<&str, u64> = History::new(vec![Transaction::committed(
            1,
            vec![Operation::read_absent("x")],
        )])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(r.reads[&read_ref_of(1, 0)].source, ResolvedSource::Initial);
    }

    #[test]
    fn aborted_write_detected() {
        let h = History::new(vec![
            Transaction::aborted(1, vec![Operation::write("x", 7)]),
            Transaction::committed(2, vec![Operation::read("x", 7)]),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(
            r.reads[&read_ref_of(2, 0)].source,
            ResolvedSource::Aborted(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn intermediate_write_detected() {
        let h = History::new(vec![
            Transaction::committed(
                1,
                vec![Operation::write("x", 7), Operation::write("x", 8)],
            ),
            Transaction::committed(2, vec![Operation::read("x", 7)]),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(
            r.reads[&read_ref_of(2, 0)].source,
            ResolvedSource::CommittedIntermediate(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn unknown_writer_degrades_to_unresolved() {
        let h = History::new(vec![
            Transaction::unknown(1, vec![Operation::write("x", 7)]),
            Transaction::committed(2, vec![Operation::read("x", 7)]),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(r.reads[&read_ref_of(2, 0)].source, ResolvedSource::Unresolved);
        assert_eq!(r.unresolved, vec![read_ref_of(2, 0)]);
        assert!(r.errors.is_empty());
    }

    #[test]
    fn phantom_value_is_an_integrity_error() {
        let h = History::new(vec![
            Transaction::committed(1, vec![Operation::write("x", 1)]),
            Transaction::committed(2, vec![Operation::read("x", 42)]),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(r.reads[&read_ref_of(2, 0)].source, ResolvedSource::Unresolved);
        assert_eq!(r.errors.len(), 1);
        assert!(matches!(
            r.errors[0],
            IntegrityError::UnmatchedRead { object: "x", observed: 42, .. }
        ));
    }

    #[test]
    fn stamp_tie_break_prefers_latest_preceding_commit() {
        // T1 and T3 both install x=7; T2 commits between them and reads 7.
        // With stamps, the read must resolve to T1 (T3 commits after T2).
        let h = History::new(vec![
            Transaction::committed(1, vec![Operation::write("x", 7)]).stamped(0, 10),
            Transaction::committed(2, vec![Operation::read("x", 7)]).stamped(11, 20),
            Transaction::committed(3, vec![Operation::write("x", 7)]).stamped(21, 30),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(
            r.reads[&read_ref_of(2, 0)].source,
            ResolvedSource::CommittedFinal(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn id_tie_break_without_stamps() {
        let h = History::new(vec![
            Transaction::committed(1, vec![Operation::write("x", 7)]),
            Transaction::committed(2, vec![Operation::read("x", 7)]),
            Transaction::committed(3, vec![Operation::write("x", 7)]),
        ])
        .unwrap();
        let r = resolve(&h);
        assert_eq!(
            r.reads[&read_ref_of(2, 0)].source,
            ResolvedSource::CommittedFinal(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }

    #[test]
    fn predicate_rows_resolve_like_reads() {
        use crate::history::types::Predicate;
        let h = History::new(vec![
            Transaction::committed(1, vec![Operation::write("a", 40)]),
            Transaction::committed(
                2,
                vec![Operation::predicate_read(
                    Predicate::GreaterThan(30),
                    vec![("a", 40)],
                )],
            ),
        ])
        .unwrap();
        let r = resolve(&h);
        let row = ReadRef::row(
            OpId {
                txn: TxnId(2),
                seq: 0,
            },
            0,
        );
        assert_eq!(
            r.reads[&row].source,
            ResolvedSource::CommittedFinal(OpId {
                txn: TxnId(1),
                seq: 0
            })
        );
    }
}
