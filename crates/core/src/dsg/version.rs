//! Per-object version order inference.
//!
//! The version order of an object is a total order over the committed final
//! writes to it. With commit stamps on every writer the install order is the
//! stamp order. Without stamps the order is recovered from observed reads:
//! a transaction that observes two versions observes them in install order,
//! and a transaction's own install succeeds any version it read. Among the
//! linear extensions of those constraints the builder picks the one that
//! minimizes antidependency edges, filling positions from the back with the
//! most-read write (its readers then antidepend on nothing) and breaking
//! ties toward the larger transaction id, so an unconstrained history
//! linearizes in ascending id order.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::hash::Hash;

use crate::graph::digraph::DiGraph;
use crate::history::types::{OpId, Outcome, TxnId};
use crate::history::History;
use crate::resolve::{Resolution, ResolvedSource};

/// What a read pinned as its source, for ordering purposes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Src {
    Init,
    Write(OpId),
}

/// The transitive closure of the write-read relation over committed
/// transactions. A writer whose version flowed (through any chain of
/// observed reads) into another transaction installed before anything that
/// transaction installs.
pub fn write_read_closure<Variable, Value>(
    history: &History<Variable, Value>,
    resolution: &Resolution<Variable, Value>,
) -> DiGraph<TxnId>
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let mut wr: DiGraph<TxnId> = DiGraph::default();
    for (read, resolved) in &resolution.reads {
        let reader = read.op.txn;
        if history.outcome_of(reader) != Some(Outcome::Committed) {
            continue;
        }
        if let ResolvedSource::CommittedFinal(write) = resolved.source {
            if write.txn != reader {
                wr.add_edge(write.txn, reader);
            }
        }
    }
    wr.closure()
}

/// Infers the version order of `object`.
///
/// `causal` is the [`write_read_closure`] of the history; a one-way causal
/// path between two writers pins their install order.
///
/// # Errors
///
/// Returns a witness pair of transactions when the observed reads admit no
/// total order (the object is then excluded from the DSG).
pub fn object_order<Variable, Value>(
    history: &History<Variable, Value>,
    resolution: &Resolution<Variable, Value>,
    causal: &DiGraph<TxnId>,
    object: &Variable,
) -> Result<Vec<OpId>, (TxnId, TxnId)>
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let candidates: Vec<OpId> = history
        .writes_of(object)
        .iter()
        .copied()
        .filter(|&w| {
            history.outcome_of(w.txn) == Some(Outcome::Committed)
                && history.is_final_write(w, object)
        })
        .collect();

    if candidates.is_empty() {
        return Ok(candidates);
    }

    // Stamped path: the install order is the commit order.
    if candidates.len() > 1
        && candidates
            .iter()
            .all(|w| history.commit_stamp(w.txn).is_some())
    {
        let mut order = candidates;
        order.sort_by_key(|w| (history.commit_stamp(w.txn), w.txn));
        return Ok(order);
    }

    constrained_order(history, resolution, causal, object, candidates)
}

fn constrained_order<Variable, Value>(
    history: &History<Variable, Value>,
    resolution: &Resolution<Variable, Value>,
    causal: &DiGraph<TxnId>,
    object: &Variable,
    candidates: Vec<OpId>,
) -> Result<Vec<OpId>, (TxnId, TxnId)>
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone,
{
    let candidate_set: BTreeSet<OpId> = candidates.iter().copied().collect();
    let mut precedes: BTreeMap<OpId, BTreeSet<OpId>> = BTreeMap::new();
    let mut readers: BTreeMap<OpId, BTreeSet<TxnId>> = BTreeMap::new();
    // Last source each transaction observed for this object.
    let mut last_seen: BTreeMap<TxnId, Src> = BTreeMap::new();
    // Source of each transaction's external reads, for read-then-write.
    let mut read_from: BTreeMap<TxnId, BTreeSet<OpId>> = BTreeMap::new();

    for (read, resolved) in &resolution.reads {
        if resolved.object != *object {
            continue;
        }
        let src = match resolved.source {
            ResolvedSource::Initial => Src::Init,
            ResolvedSource::CommittedFinal(w) if candidate_set.contains(&w) => Src::Write(w),
            _ => continue,
        };
        let reader = read.op.txn;

        if let Src::Write(w) = src {
            if w.txn != reader {
                readers.entry(w).or_default().insert(reader);
                read_from.entry(reader).or_default().insert(w);
            }
        }

        // Reads within one transaction observe versions in install order.
        match (last_seen.get(&reader).copied(), src) {
            (Some(Src::Write(prev)), Src::Write(cur)) if prev != cur => {
                precedes.entry(prev).or_default().insert(cur);
            }
            (Some(Src::Write(prev)), Src::Init) => {
                // Saw an installed version, then the pre-history state:
                // nothing can precede the initial version.
                return Err((prev.txn, reader));
            }
            _ => {}
        }
        last_seen.insert(reader, src);
    }

    // A transaction's own install succeeds anything it read.
    for &w in &candidates {
        if let Some(sources) = read_from.get(&w.txn) {
            for &source in sources {
                if source != w {
                    precedes.entry(source).or_default().insert(w);
                }
            }
        }
    }

    // A one-way causal path between two writers pins their install order.
    for &a in &candidates {
        for &b in &candidates {
            if a.txn != b.txn
                && causal.has_edge(&a.txn, &b.txn)
                && !causal.has_edge(&b.txn, &a.txn)
            {
                precedes.entry(a).or_default().insert(b);
            }
        }
    }

    // Fill positions from the back: any write with no unplaced successor may
    // go last; prefer the most-read one, ties toward the larger id.
    let mut remaining = candidate_set;
    let mut reversed: Vec<OpId> = Vec::with_capacity(candidates.len());
    while !remaining.is_empty() {
        let mut pick: Option<(usize, OpId)> = None;
        for &w in &remaining {
            let blocked = precedes
                .get(&w)
                .is_some_and(|succs| succs.iter().any(|s| remaining.contains(s)));
            if blocked {
                continue;
            }
            let fanout = readers.get(&w).map_or(0, BTreeSet::len);
            let better = match pick {
                None => true,
                Some((best_fanout, best)) => {
                    fanout > best_fanout || (fanout == best_fanout && w.txn > best.txn)
                }
            };
            if better {
                pick = Some((fanout, w));
            }
        }
        match pick {
            Some((_, w)) => {
                remaining.remove(&w);
                reversed.push(w);
            }
            None => {
                // Every remaining write has a remaining successor: a cycle.
                let witness = remaining
                    .iter()
                    .find_map(|&a| {
                        precedes.get(&a).and_then(|succs| {
                            succs
                                .iter()
                                .find(|s| remaining.contains(s))
                                .map(|&b| (a.txn, b.txn))
                        })
                    })
                    .unwrap_or_else(|| {
                        let first = *remaining.iter().next().expect("remaining is non-empty");
                        (first.txn, first.txn)
                    });
                return Err(witness);
            }
        }
    }

    reversed.reverse();
    Ok(reversed)
}
