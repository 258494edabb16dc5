//! The isolation-level filter: which findings each level reports.

mod common;

use adya_core::{check, AnomalyKind, IsolationLevel};

use common::hist;

fn kinds_at(
    h: &adya_core::history::History<&'static str, u64>,
    level: IsolationLevel,
) -> Vec<AnomalyKind> {
    check(h, level, None)
        .anomalies
        .iter()
        .map(adya_core::Anomaly::kind)
        .collect()
}

/// G1a and G1b are suppressed only under read uncommitted.
#[test]
fn dirty_reads_filtered_by_level() {
    let h = hist(vec![
        txn!(1 => aborted [w(x, 7)]),
        txn!(2 => committed [w(y, 1), w(y, 2)]),
        txn!(3 => committed [r(x, 7), r(y, 1)]),
    ]);

    assert_eq!(kinds_at(&h, IsolationLevel::ReadUncommitted), vec![]);
    for level in [
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::SnapshotIsolation,
        IsolationLevel::Serializable,
    ] {
        assert_eq!(
            kinds_at(&h, level),
            vec![AnomalyKind::G1a, AnomalyKind::G1b],
            "{level}"
        );
    }
}

/// A pure write-read cycle is circular information flow, visible from read
/// committed upward. Read uncommitted only chases write cycles and stays
/// clean.
#[test]
fn information_flow_cycle_is_g1c() {
    let h = hist(vec![
        txn!(1 => committed [w(x, 1), r(y, 2)]),
        txn!(2 => committed [w(y, 2), r(x, 1)]),
    ]);

    assert_eq!(kinds_at(&h, IsolationLevel::ReadUncommitted), vec![]);
    for level in [
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::SnapshotIsolation,
        IsolationLevel::Serializable,
    ] {
        assert_eq!(kinds_at(&h, level), vec![AnomalyKind::G1c], "{level}");
    }
}

/// Write skew: two item anti-dependencies, no predicate. A G2-item --
/// forbidden under repeatable read and serializable, permitted under
/// snapshot isolation (and below).
#[test]
fn write_skew_is_g2_item() {
    let h = hist(vec![
        txn!(0 => committed [w(x, 0), w(y, 0)]),
        txn!(1 => committed [r(x, 0), w(y, 1)]),
        txn!(2 => committed [r(y, 0), w(x, 1)]),
    ]);

    assert_eq!(
        kinds_at(&h, IsolationLevel::RepeatableRead),
        vec![AnomalyKind::G2Item]
    );
    assert_eq!(
        kinds_at(&h, IsolationLevel::Serializable),
        vec![AnomalyKind::G2Item]
    );
    assert_eq!(kinds_at(&h, IsolationLevel::SnapshotIsolation), vec![]);
    assert_eq!(kinds_at(&h, IsolationLevel::ReadCommitted), vec![]);
    assert_eq!(kinds_at(&h, IsolationLevel::ReadUncommitted), vec![]);
}

/// Every reported kind is genuinely proscribed: either the kind itself or,
/// for cycles, one of the structural predicates the cycle satisfies.
#[test]
fn reported_kinds_respect_the_forbidden_set() {
    let histories = vec![
        hist(vec![
            txn!(0 => committed [w(x, 0)]),
            txn!(1 => committed [r(x, 0), w(x, 1)]),
            txn!(2 => committed [r(x, 0), w(x, 2)]),
        ]),
        hist(vec![
            txn!(1 => aborted [w(x, 7)]),
            txn!(2 => committed [r(x, 7)]),
        ]),
        hist(vec![
            txn!(1 => committed [w(x, 1), r(y, 2)]),
            txn!(2 => committed [w(y, 2), r(x, 1)]),
        ]),
    ];

    for h in &histories {
        for level in IsolationLevel::ALL {
            for anomaly in check(h, level, None).anomalies {
                match anomaly {
                    adya_core::Anomaly::Cycle { kind, ref labels, .. } => {
                        assert!(kind.matches_cycle(labels));
                        assert!(
                            adya_core::anomaly::satisfied_kinds(labels)
                                .iter()
                                .any(|&k| level.forbids_kind(k)),
                            "{level}: cycle {labels:?} not forbidden"
                        );
                    }
                    other => {
                        assert!(level.forbids_kind(other.kind()), "{level}: {other:?}");
                    }
                }
            }
        }
    }
}
