//! Anomaly naming, isolation levels, and the top-level check.
//!
//! A cycle is named by the first structural predicate it matches, in order
//! of specificity (G0, G1c, G-single, G2-item, G2). An isolation level is a
//! set of forbidden anomaly kinds; a cycle is reported under a level when
//! any predicate it satisfies is forbidden there, so a lost update keeps
//! its G-single name but is still reported under repeatable read, where it
//! counts as an item anti-dependency cycle.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use core::hash::Hash;
use core::str::FromStr;

use crate::dsg::{cycles, Dsg, EdgeKind, EdgeLabel};
use crate::history::types::{OpId, ReadRef, TxnId};
use crate::history::History;
use crate::noncycle;
use crate::resolve::{self, IntegrityError};

/// The anomaly families this checker names.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnomalyKind {
    /// Write cycle: every edge is WW.
    G0,
    /// Aborted read.
    G1a,
    /// Intermediate read.
    G1b,
    /// Circular information flow: WW/WR cycle with at least one WR.
    G1c,
    /// Exactly one anti-dependency edge closes the cycle.
    GSingle,
    /// Item anti-dependency cycle.
    G2Item,
    /// Anti-dependency cycle involving a predicate.
    G2,
}

/// Cycle kinds in classification order; the first match names the cycle.
pub const CYCLE_CLASSIFICATION: [AnomalyKind; 5] = [
    AnomalyKind::G0,
    AnomalyKind::G1c,
    AnomalyKind::GSingle,
    AnomalyKind::G2Item,
    AnomalyKind::G2,
];

impl AnomalyKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::G0 => "G0",
            Self::G1a => "G1a",
            Self::G1b => "G1b",
            Self::G1c => "G1c",
            Self::GSingle => "G-single",
            Self::G2Item => "G2-item",
            Self::G2 => "G2",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::G0 => "G0: write cycles",
            Self::G1a => "G1a: aborted reads",
            Self::G1b => "G1b: intermediate reads",
            Self::G1c => "G1c: circular information flow",
            Self::GSingle => "G-single: single anti-dependency cycles",
            Self::G2Item => "G2-item: item anti-dependency cycles",
            Self::G2 => "G2: anti-dependency cycles",
        }
    }

    /// The edge kinds a cycle of this family may traverse. Empty for the
    /// non-cyclic families.
    #[must_use]
    pub const fn cycle_edge_kinds(self) -> &'static [EdgeKind] {
        match self {
            Self::G1a | Self::G1b => &[],
            Self::G0 => &[EdgeKind::Ww],
            Self::G1c => &[EdgeKind::Ww, EdgeKind::Wr],
            Self::G2Item => &[EdgeKind::Ww, EdgeKind::Wr, EdgeKind::Rw],
            Self::GSingle | Self::G2 => {
                &[EdgeKind::Ww, EdgeKind::Wr, EdgeKind::Rw, EdgeKind::Prw]
            }
        }
    }

    /// Whether a cycle with these coalesced edge labels belongs to this
    /// family. Meaningful only for the cyclic kinds.
    #[must_use]
    pub fn matches_cycle(self, labels: &[BTreeSet<EdgeKind>]) -> bool {
        let within = |allowed: &[EdgeKind]| {
            labels
                .iter()
                .all(|label| label.iter().all(|kind| allowed.contains(kind)))
        };
        match self {
            Self::G1a | Self::G1b => false,
            Self::G0 => within(&[EdgeKind::Ww]),
            Self::G1c => {
                within(&[EdgeKind::Ww, EdgeKind::Wr])
                    && labels.iter().any(|label| label.contains(&EdgeKind::Wr))
            }
            Self::GSingle => {
                let anti: Vec<&BTreeSet<EdgeKind>> = labels
                    .iter()
                    .filter(|label| label.iter().any(|kind| kind.is_anti()))
                    .collect();
                anti.len() == 1 && anti[0].iter().all(|kind| kind.is_anti())
            }
            Self::G2Item => {
                within(&[EdgeKind::Ww, EdgeKind::Wr, EdgeKind::Rw])
                    && labels.iter().any(|label| label.contains(&EdgeKind::Rw))
            }
            Self::G2 => labels.iter().any(|label| label.contains(&EdgeKind::Prw)),
        }
    }
}

impl Display for AnomalyKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names a cycle: the first matching predicate in classification order.
#[must_use]
pub fn classify_cycle(labels: &[BTreeSet<EdgeKind>]) -> Option<AnomalyKind> {
    CYCLE_CLASSIFICATION
        .into_iter()
        .find(|kind| kind.matches_cycle(labels))
}

/// Every predicate a cycle satisfies (for the level filter).
#[must_use]
pub fn satisfied_kinds(labels: &[BTreeSet<EdgeKind>]) -> Vec<AnomalyKind> {
    CYCLE_CLASSIFICATION
        .into_iter()
        .filter(|kind| kind.matches_cycle(labels))
        .collect()
}

/// A named finding with its evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly<Variable> {
    /// G1a: `read` observed `object` from `writer`, which aborted.
    AbortedRead {
        read: ReadRef,
        object: Variable,
        writer: OpId,
    },
    /// G1b: `read` observed a version of `object` that `writer`'s
    /// transaction overwrote before committing.
    IntermediateRead {
        read: ReadRef,
        object: Variable,
        writer: OpId,
    },
    /// A DSG cycle. `nodes` is in canonical rotation; `labels[i]` is the
    /// coalesced label of the edge from `nodes[i]` to the next node.
    Cycle {
        kind: AnomalyKind,
        nodes: Vec<TxnId>,
        labels: Vec<BTreeSet<EdgeKind>>,
    },
}

impl<Variable> Anomaly<Variable> {
    #[must_use]
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Self::AbortedRead { .. } => AnomalyKind::G1a,
            Self::IntermediateRead { .. } => AnomalyKind::G1b,
            Self::Cycle { kind, .. } => *kind,
        }
    }

    /// The transactions implicated in this finding.
    #[must_use]
    pub fn participants(&self) -> Vec<TxnId> {
        match self {
            Self::AbortedRead { read, writer, .. }
            | Self::IntermediateRead { read, writer, .. } => {
                let mut participants = Vec::new();
                participants.push(read.op.txn);
                if writer.txn != read.op.txn {
                    participants.push(writer.txn);
                }
                participants
            }
            Self::Cycle { nodes, .. } => nodes.clone(),
        }
    }
}

impl<Variable: Display> Display for Anomaly<Variable> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::AbortedRead {
                read,
                object,
                writer,
            } => write!(
                f,
                "G1a: {} read {object} written by aborted {} [{} <- {}]",
                read.op.txn, writer.txn, read.op, writer
            ),
            Self::IntermediateRead {
                read,
                object,
                writer,
            } => write!(
                f,
                "G1b: {} read an intermediate version of {object} written by {} [{} <- {}]",
                read.op.txn, writer.txn, read.op, writer
            ),
            Self::Cycle {
                kind,
                nodes,
                labels,
            } => {
                write!(f, "{kind}: ")?;
                for (node, label) in nodes.iter().zip(labels.iter()) {
                    write!(f, "{node} -")?;
                    for (i, edge_kind) in label.iter().enumerate() {
                        if i > 0 {
                            write!(f, "+")?;
                        }
                        write!(f, "{edge_kind}")?;
                    }
                    write!(f, "-> ")?;
                }
                write!(f, "{}", nodes[0])
            }
        }
    }
}

/// An isolation level, i.e. a named set of forbidden anomaly kinds.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    SnapshotIsolation,
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [Self; 5] = [
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::SnapshotIsolation,
        Self::Serializable,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "read uncommitted",
            Self::ReadCommitted => "read committed",
            Self::RepeatableRead => "repeatable read",
            Self::SnapshotIsolation => "snapshot isolation",
            Self::Serializable => "serializable",
        }
    }

    /// The anomaly kinds this level proscribes.
    #[must_use]
    pub const fn forbids(self) -> &'static [AnomalyKind] {
        match self {
            Self::ReadUncommitted => &[AnomalyKind::G0],
            Self::ReadCommitted => &[
                AnomalyKind::G0,
                AnomalyKind::G1a,
                AnomalyKind::G1b,
                AnomalyKind::G1c,
            ],
            Self::RepeatableRead => &[
                AnomalyKind::G0,
                AnomalyKind::G1a,
                AnomalyKind::G1b,
                AnomalyKind::G1c,
                AnomalyKind::G2Item,
            ],
            Self::SnapshotIsolation => &[
                AnomalyKind::G0,
                AnomalyKind::G1a,
                AnomalyKind::G1b,
                AnomalyKind::G1c,
                AnomalyKind::GSingle,
            ],
            Self::Serializable => &[
                AnomalyKind::G0,
                AnomalyKind::G1a,
                AnomalyKind::G1b,
                AnomalyKind::G1c,
                AnomalyKind::GSingle,
                AnomalyKind::G2Item,
                AnomalyKind::G2,
            ],
        }
    }

    #[must_use]
    pub fn forbids_kind(self, kind: AnomalyKind) -> bool {
        self.forbids().contains(&kind)
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing an isolation level string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError;

impl Display for ParseLevelError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("unknown isolation level")
    }
}

impl FromStr for IsolationLevel {
    type Err = ParseLevelError;

    /// Case-insensitive; spaces, dashes and underscores are equivalent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut normalized = String::with_capacity(s.len());
        let mut pending_space = false;
        for c in s.trim().chars() {
            if matches!(c, ' ' | '-' | '_') {
                pending_space = !normalized.is_empty();
            } else {
                if pending_space {
                    normalized.push(' ');
                    pending_space = false;
                }
                normalized.push(c.to_ascii_lowercase());
            }
        }
        match normalized.as_str() {
            "read uncommitted" => Ok(Self::ReadUncommitted),
            "read committed" => Ok(Self::ReadCommitted),
            "repeatable read" => Ok(Self::RepeatableRead),
            "snapshot" | "snapshot isolation" => Ok(Self::SnapshotIsolation),
            "serializable" | "serializability" => Ok(Self::Serializable),
            _ => Err(ParseLevelError),
        }
    }
}

/// The outcome of a check.
#[derive(Debug, Clone)]
pub struct Report<Variable, Value> {
    pub level: IsolationLevel,
    /// Findings forbidden at `level`, in deterministic order.
    pub anomalies: Vec<Anomaly<Variable>>,
    /// Input problems; non-empty means the analysis skipped something.
    pub integrity: Vec<IntegrityError<Variable, Value>>,
    /// Reads attributable only to transactions of unknown fate.
    pub unresolved: Vec<ReadRef>,
    /// False when integrity errors excluded reads or objects.
    pub complete: bool,
}

impl<Variable, Value> Report<Variable, Value> {
    /// No findings and nothing skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.complete
    }
}

/// Checks a history against an isolation level.
///
/// Returns every forbidden anomaly (up to `limit`, when given). Anomaly
/// presence is the success path; only malformed input surfaces as
/// integrity errors inside the report.
pub fn check<Variable, Value>(
    history: &History<Variable, Value>,
    level: IsolationLevel,
    limit: Option<usize>,
) -> Report<Variable, Value>
where
    Variable: Eq + Hash + Clone + Ord,
    Value: Eq + Clone + Ord,
{
    tracing::debug!(level = %level, ?limit, "checking history");

    if history.committed().next().is_none() {
        tracing::debug!("no committed transactions; trivially clean");
        return Report {
            level,
            anomalies: Vec::new(),
            integrity: Vec::new(),
            unresolved: Vec::new(),
            complete: true,
        };
    }

    let resolution = resolve::resolve(history);
    let mut integrity = resolution.errors.clone();
    let cap = limit.unwrap_or(usize::MAX);
    let mut anomalies = Vec::new();

    for anomaly in noncycle::find_noncyclic(&resolution) {
        if anomalies.len() >= cap {
            break;
        }
        if level.forbids_kind(anomaly.kind()) {
            anomalies.push(anomaly);
        }
    }

    let mut edge_kinds: BTreeSet<EdgeKind> = BTreeSet::new();
    for kind in level.forbids() {
        edge_kinds.extend(kind.cycle_edge_kinds());
    }
    let edge_kinds: Vec<EdgeKind> = edge_kinds.into_iter().collect();

    if !edge_kinds.is_empty() && anomalies.len() < cap {
        let (dsg, order_errors) = Dsg::build(history, &resolution, &edge_kinds);
        integrity.extend(order_errors);

        cycles::enumerate(&dsg, |cycle| {
            let labels: Vec<BTreeSet<EdgeKind>> = (0..cycle.len())
                .map(|i| {
                    dsg.label(cycle[i], cycle[(i + 1) % cycle.len()])
                        .map(EdgeLabel::kind_set)
                        .unwrap_or_default()
                })
                .collect();
            let reportable = satisfied_kinds(&labels)
                .iter()
                .any(|&kind| level.forbids_kind(kind));
            if reportable {
                if let Some(kind) = classify_cycle(&labels) {
                    anomalies.push(Anomaly::Cycle {
                        kind,
                        nodes: cycle.to_vec(),
                        labels,
                    });
                }
            }
            anomalies.len() < cap
        });
    }

    let complete = integrity.is_empty();
    tracing::debug!(
        anomalies = anomalies.len(),
        complete,
        "check finished"
    );

    Report {
        level,
        anomalies,
        integrity,
        unresolved: resolution.unresolved,
        complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(sets: &[&[EdgeKind]]) -> Vec<BTreeSet<EdgeKind>> {
        sets.iter()
            .map(|kinds| kinds.iter().copied().collect())
            .collect()
    }

    #[test]
    fn classification_is_most_specific_first() {
        use EdgeKind::{Prw, Rw, Wr, Ww};
        assert_eq!(
            classify_cycle(&labels(&[&[Ww], &[Ww]])),
            Some(AnomalyKind::G0)
        );
        assert_eq!(
            classify_cycle(&labels(&[&[Ww], &[Wr]])),
            Some(AnomalyKind::G1c)
        );
        assert_eq!(
            classify_cycle(&labels(&[&[Ww], &[Rw]])),
            Some(AnomalyKind::GSingle)
        );
        assert_eq!(
            classify_cycle(&labels(&[&[Rw], &[Rw]])),
            Some(AnomalyKind::G2Item)
        );
        assert_eq!(
            classify_cycle(&labels(&[&[Prw], &[Rw]])),
            Some(AnomalyKind::G2)
        );
        assert_eq!(
            classify_cycle(&labels(&[&[Ww], &[Prw]])),
            Some(AnomalyKind::GSingle)
        );
    }

    #[test]
    fn g_single_requires_pure_anti_edge() {
        use EdgeKind::{Rw, Ww};
        // The only anti edge also carries ww: not G-single, still G2-item.
        let mixed = labels(&[&[Ww], &[Ww, Rw]]);
        assert!(!AnomalyKind::GSingle.matches_cycle(&mixed));
        assert_eq!(classify_cycle(&mixed), Some(AnomalyKind::G2Item));
    }

    #[test]
    fn satisfied_kinds_cover_families() {
        use EdgeKind::{Rw, Ww};
        let lost_update = labels(&[&[Ww], &[Rw]]);
        let satisfied = satisfied_kinds(&lost_update);
        assert!(satisfied.contains(&AnomalyKind::GSingle));
        assert!(satisfied.contains(&AnomalyKind::G2Item));
        assert!(!satisfied.contains(&AnomalyKind::G0));
    }

    #[test]
    fn forbidden_sets_grow_with_level() {
        assert_eq!(IsolationLevel::ReadUncommitted.forbids().len(), 1);
        assert!(IsolationLevel::ReadCommitted.forbids_kind(AnomalyKind::G1a));
        assert!(!IsolationLevel::ReadCommitted.forbids_kind(AnomalyKind::G2Item));
        assert!(IsolationLevel::RepeatableRead.forbids_kind(AnomalyKind::G2Item));
        assert!(!IsolationLevel::RepeatableRead.forbids_kind(AnomalyKind::GSingle));
        assert!(IsolationLevel::SnapshotIsolation.forbids_kind(AnomalyKind::GSingle));
        assert!(!IsolationLevel::SnapshotIsolation.forbids_kind(AnomalyKind::G2));
        assert!(IsolationLevel::Serializable.forbids_kind(AnomalyKind::G2));
    }

    #[test]
    fn level_parsing_is_forgiving() {
        assert_eq!(
            "Read Committed".parse::<IsolationLevel>(),
            Ok(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            "REPEATABLE_READ".parse::<IsolationLevel>(),
            Ok(IsolationLevel::RepeatableRead)
        );
        assert_eq!(
            "snapshot-isolation".parse::<IsolationLevel>(),
            Ok(IsolationLevel::SnapshotIsolation)
        );
        assert_eq!(
            "snapshot".parse::<IsolationLevel>(),
            Ok(IsolationLevel::SnapshotIsolation)
        );
        assert_eq!(
            " serializable ".parse::<IsolationLevel>(),
            Ok(IsolationLevel::Serializable)
        );
        assert!("chaos".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn anomaly_display_is_one_line() {
        use crate::history::types::{OpId, ReadRef, TxnId};
        let anomaly: Anomaly<&str> = Anomaly::Cycle {
            kind: AnomalyKind::GSingle,
            nodes: vec![TxnId(1), TxnId(2)],
            labels: labels(&[&[EdgeKind::Ww], &[EdgeKind::Rw]]),
        };
        assert_eq!(format!("{anomaly}"), "G-single: T1 -ww-> T2 -rw-> T1");

        let anomaly: Anomaly<&str> = Anomaly::AbortedRead {
            read: ReadRef::item(OpId {
                txn: TxnId(2),
                seq: 0,
            }),
            object: "x",
            writer: OpId {
                txn: TxnId(1),
                seq: 0,
            },
        };
        assert_eq!(
            format!("{anomaly}"),
            "G1a: T2 read x written by aborted T1 [T2.0 <- T1.0]"
        );
    }
}
