//! Direct Serialization Graph construction.
//!
//! Nodes are the committed transactions; edges are the Adya dependencies
//! between them. At most one edge exists per ordered pair; its label is the
//! set of dependency kinds with, per kind, the operations that justify it.
//!
//! Edge kinds:
//! - `Ww`: the source's final write of an object immediately precedes the
//!   target's in the inferred version order (direct successor only).
//! - `Wr`: a read in the target resolved to the source's final write.
//! - `Rw`: a read in the source observed the version the target overwrote
//!   (the target owns the version-order successor of the read's source).
//! - `Prw`: the predicate analogue of `Rw` -- the target's write would have
//!   changed the row set a predicate read in the source returned.

pub mod cycles;
pub mod version;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use core::hash::Hash;

use crate::history::types::{OpId, Operation, Outcome, ReadRef, TxnId};
use crate::history::History;
use crate::resolve::{IntegrityError, Resolution, ResolvedSource};

/// Dependency kind of a DSG edge.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Ww,
    Wr,
    Rw,
    Prw,
}

impl EdgeKind {
    /// The item/predicate anti-dependency kinds, rendered dashed and
    /// counted by the G-single/G2 predicates.
    #[must_use]
    pub const fn is_anti(self) -> bool {
        matches!(self, Self::Rw | Self::Prw)
    }
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Ww => write!(f, "ww"),
            Self::Wr => write!(f, "wr"),
            Self::Rw => write!(f, "rw"),
            Self::Prw => write!(f, "prw"),
        }
    }
}

/// Every edge kind, in label order.
pub const ALL_EDGE_KINDS: [EdgeKind; 4] = [EdgeKind::Ww, EdgeKind::Wr, EdgeKind::Rw, EdgeKind::Prw];

/// The operations that justify one kind of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Justification<Variable> {
    pub object: Variable,
    /// The operation in the edge's source transaction.
    pub from_op: OpId,
    /// The operation in the edge's target transaction.
    pub to_op: OpId,
}

/// Coalesced label of one edge: kinds with their provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel<Variable> {
    pub kinds: BTreeMap<EdgeKind, Vec<Justification<Variable>>>,
}

impl<Variable> Default for EdgeLabel<Variable> {
    fn default() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }
}

impl<Variable> EdgeLabel<Variable> {
    /// The set of kinds on this edge.
    #[must_use]
    pub fn kind_set(&self) -> BTreeSet<EdgeKind> {
        self.kinds.keys().copied().collect()
    }
}

/// The Direct Serialization Graph of a history.
#[derive(Debug, Clone)]
pub struct Dsg<Variable: Ord> {
    /// Committed transactions, ascending.
    pub nodes: Vec<TxnId>,
    /// One entry per ordered pair with at least one dependency.
    pub edges: BTreeMap<(TxnId, TxnId), EdgeLabel<Variable>>,
    /// Per-object version order over committed final writes.
    pub version_orders: BTreeMap<Variable, Vec<OpId>>,
    /// Objects excluded because their reads admit no version order.
    pub excluded: Vec<Variable>,
}

impl<Variable> Dsg<Variable>
where
    Variable: Eq + Hash + Clone + Ord,
{
    /// Builds the DSG restricted to the given edge kinds.
    ///
    /// Restricting kinds only drops edges; it never changes the label of an
    /// edge kind that is kept. Version-order conflicts are returned as
    /// integrity errors and exclude the object.
    pub fn build<Value>(
        history: &History<Variable, Value>,
        resolution: &Resolution<Variable, Value>,
        kinds: &[EdgeKind],
    ) -> (Self, Vec<IntegrityError<Variable, Value>>)
    where
        Value: Eq + Clone + Ord,
    {
        let nodes: Vec<TxnId> = history.committed().map(|txn| txn.id).collect();
        let mut dsg = Self {
            nodes,
            edges: BTreeMap::new(),
            version_orders: BTreeMap::new(),
            excluded: Vec::new(),
        };
        let mut errors = Vec::new();

        let causal = version::write_read_closure(history, resolution);
        for object in history.objects() {
            match version::object_order(history, resolution, &causal, object) {
                Ok(order) => {
                    dsg.version_orders.insert(object.clone(), order);
                }
                Err((first, second)) => {
                    dsg.excluded.push(object.clone());
                    errors.push(IntegrityError::VersionOrderConflict {
                        object: object.clone(),
                        first,
                        second,
                    });
                }
            }
        }

        let want = |kind: EdgeKind| kinds.contains(&kind);

        if want(EdgeKind::Ww) {
            dsg.add_write_dependencies();
        }
        if want(EdgeKind::Wr) {
            dsg.add_read_dependencies(history, resolution);
        }
        if want(EdgeKind::Rw) {
            dsg.add_anti_dependencies(history, resolution);
        }
        if want(EdgeKind::Prw) {
            dsg.add_predicate_anti_dependencies(history, resolution);
        }

        tracing::debug!(
            nodes = dsg.nodes.len(),
            edges = dsg.edges.len(),
            excluded = dsg.excluded.len(),
            "built direct serialization graph"
        );

        (dsg, errors)
    }

    /// The label of the edge from `from` to `to`, if present.
    #[must_use]
    pub fn label(&self, from: TxnId, to: TxnId) -> Option<&EdgeLabel<Variable>> {
        self.edges.get(&(from, to))
    }

    fn add(&mut self, from: TxnId, to: TxnId, kind: EdgeKind, just: Justification<Variable>) {
        if from == to {
            return;
        }
        self.edges
            .entry((from, to))
            .or_default()
            .kinds
            .entry(kind)
            .or_default()
            .push(just);
    }

    fn add_write_dependencies(&mut self) {
        let mut edges = Vec::new();
        for (object, order) in &self.version_orders {
            for pair in order.windows(2) {
                edges.push((
                    pair[0].txn,
                    pair[1].txn,
                    Justification {
                        object: object.clone(),
                        from_op: pair[0],
                        to_op: pair[1],
                    },
                ));
            }
        }
        for (from, to, just) in edges {
            self.add(from, to, EdgeKind::Ww, just);
        }
    }

    fn add_read_dependencies<Value>(
        &mut self,
        history: &History<Variable, Value>,
        resolution: &Resolution<Variable, Value>,
    ) where
        Value: Eq + Clone,
    {
        for (&read, resolved) in &resolution.reads {
            let reader = read.op.txn;
            if history.outcome_of(reader) != Some(Outcome::Committed) {
                continue;
            }
            if let ResolvedSource::CommittedFinal(write) = resolved.source {
                self.add(
                    write.txn,
                    reader,
                    EdgeKind::Wr,
                    Justification {
                        object: resolved.object.clone(),
                        from_op: write,
                        to_op: read.op,
                    },
                );
            }
        }
    }

    /// The version-order successor of a read's source, if any.
    fn successor_of(&self, object: &Variable, source: ResolvedSource) -> Option<OpId> {
        let order = self.version_orders.get(object)?;
        match source {
            ResolvedSource::Initial => order.first().copied(),
            ResolvedSource::CommittedFinal(write) => {
                let index = order.iter().position(|&op| op == write)?;
                order.get(index + 1).copied()
            }
            _ => None,
        }
    }

    fn add_anti_dependencies<Value>(
        &mut self,
        history: &History<Variable, Value>,
        resolution: &Resolution<Variable, Value>,
    ) where
        Value: Eq + Clone,
    {
        for (&read, resolved) in &resolution.reads {
            // Predicate-read rows antidepend through Prw, not Rw.
            if read.row.is_some() {
                continue;
            }
            let reader = read.op.txn;
            if history.outcome_of(reader) != Some(Outcome::Committed) {
                continue;
            }
            let Some(successor) = self.successor_of(&resolved.object, resolved.source) else {
                continue;
            };
            if successor.txn != reader {
                self.add(
                    reader,
                    successor.txn,
                    EdgeKind::Rw,
                    Justification {
                        object: resolved.object.clone(),
                        from_op: read.op,
                        to_op: successor,
                    },
                );
            }
        }
    }

    fn add_predicate_anti_dependencies<Value>(
        &mut self,
        history: &History<Variable, Value>,
        resolution: &Resolution<Variable, Value>,
    ) where
        Value: Eq + Clone + Ord,
    {
        let objects: Vec<Variable> = history.objects().into_iter().cloned().collect();

        let mut edges = Vec::new();
        for txn in history.committed() {
            for seq_op in &txn.ops {
                let Operation::PredicateRead {
                    predicate,
                    observed,
                } = &seq_op.op
                else {
                    continue;
                };
                let op_id = OpId {
                    txn: txn.id,
                    seq: seq_op.seq,
                };

                // A later write to a returned row changes or removes it from
                // the match set.
                let mut returned: BTreeSet<&Variable> = BTreeSet::new();
                for (row, (object, _)) in (0..).zip(observed.iter()) {
                    returned.insert(object);
                    let Some(resolved) = resolution.reads.get(&ReadRef::row(op_id, row)) else {
                        continue;
                    };
                    let Some(successor) = self.successor_of(object, resolved.source) else {
                        continue;
                    };
                    if successor.txn != txn.id {
                        edges.push((
                            txn.id,
                            successor.txn,
                            Justification {
                                object: object.clone(),
                                from_op: op_id,
                                to_op: successor,
                            },
                        ));
                    }
                }

                // For a row the predicate did not return, the read observed
                // some non-matching version. The write that would have
                // inserted the row into the match set is the first matching
                // version after the last non-matching one; anything earlier
                // was itself overwritten by a non-matching version the read
                // could have seen instead.
                for object in &objects {
                    if returned.contains(object) {
                        continue;
                    }
                    let Some(order) = self.version_orders.get(object) else {
                        continue;
                    };
                    let first_insert = order
                        .iter()
                        .rposition(|&write| {
                            !history
                                .written_value(write, object)
                                .is_some_and(|value| predicate.matches(value))
                        })
                        .map_or(0, |i| i + 1);
                    if let Some(&write) = order.get(first_insert) {
                        if write.txn != txn.id {
                            edges.push((
                                txn.id,
                                write.txn,
                                Justification {
                                    object: object.clone(),
                                    from_op: op_id,
                                    to_op: write,
                                },
                            ));
                        }
                    }
                }
            }
        }

        for (from, to, just) in edges {
            self.add(from, to, EdgeKind::Prw, just);
        }
    }
}
