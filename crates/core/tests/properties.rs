//! Cross-cutting guarantees: determinism, idempotence, caps, degraded input.

mod common;

use adya_core::dsg::{Dsg, ALL_EDGE_KINDS};
use adya_core::history::types::TxnId;
use adya_core::resolve::resolve;
use adya_core::{check, IsolationLevel};

use common::hist;

/// Serial histories over disjoint objects carry no anomalies at any level.
#[test]
fn serial_history_is_clean_everywhere() {
    let h = hist(vec![
        txn!(1 => committed @ (0, 10) [w(a, 1), r(a, 1)]),
        txn!(2 => committed @ (20, 30) [w(b, 1), r(b, 1)]),
        txn!(3 => committed @ (40, 50) [w(c, 1), r(c, 1), w(c, 2)]),
    ]);
    for level in IsolationLevel::ALL {
        let report = check(&h, level, None);
        assert!(report.is_clean(), "{level}: {:?}", report.anomalies);
    }
}

/// Building the DSG twice from the same history yields equal edge sets with
/// equal labels and version orders.
#[test]
fn dsg_build_is_idempotent() {
    let h = hist(vec![
        txn!(0 => committed [w(x, 0)]),
        txn!(1 => committed [r(x, 0), w(x, 1)]),
        txn!(2 => committed [r(x, 0), w(x, 2)]),
        txn!(3 => committed [r(x, 1), r(x, 2)]),
    ]);
    let resolution = resolve(&h);
    let (first, _) = Dsg::build(&h, &resolution, &ALL_EDGE_KINDS);
    let (second, _) = Dsg::build(&h, &resolution, &ALL_EDGE_KINDS);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.version_orders, second.version_orders);
    assert_eq!(first.nodes, second.nodes);
}

/// The cap stops enumeration after the requested number of findings.
#[test]
fn limit_caps_the_report() {
    // Two independent lost updates plus an aborted read.
    let h = hist(vec![
        txn!(0 => committed [w(x, 0), w(y, 0)]),
        txn!(1 => committed [r(x, 0), w(x, 1)]),
        txn!(2 => committed [r(x, 0), w(x, 2)]),
        txn!(3 => committed [r(y, 0), w(y, 1)]),
        txn!(4 => committed [r(y, 0), w(y, 2)]),
        txn!(5 => aborted [w(z, 9)]),
        txn!(6 => committed [r(z, 9)]),
    ]);

    let full = check(&h, IsolationLevel::Serializable, None);
    assert!(full.anomalies.len() >= 3, "{:?}", full.anomalies);

    for cap in 1..=3 {
        let report = check(&h, IsolationLevel::Serializable, Some(cap));
        assert_eq!(report.anomalies.len(), cap);
        // The capped prefix agrees with the uncapped report.
        assert_eq!(
            format!("{:?}", report.anomalies),
            format!("{:?}", &full.anomalies[..cap])
        );
    }
}

/// A history with no committed transaction reports nothing and exits clean.
#[test]
fn no_committed_transactions_is_trivially_clean() {
    let h = hist(vec![
        txn!(1 => aborted [w(x, 1)]),
        txn!(2 => unknown [w(y, 1)]),
    ]);
    for level in IsolationLevel::ALL {
        let report = check(&h, level, None);
        assert!(report.is_clean());
        assert!(report.anomalies.is_empty());
    }
}

/// Transactions of unknown fate never enter the DSG; reads only they could
/// explain degrade to warnings rather than anomalies or errors.
#[test]
fn unknown_outcome_is_conservative() {
    let h = hist(vec![
        txn!(1 => unknown [w(x, 7)]),
        txn!(2 => committed [r(x, 7)]),
    ]);

    let resolution = resolve(&h);
    let (dsg, errors) = Dsg::build(&h, &resolution, &ALL_EDGE_KINDS);
    assert!(errors.is_empty());
    assert_eq!(dsg.nodes, vec![TxnId(2)]);
    assert!(dsg.edges.is_empty());

    let report = check(&h, IsolationLevel::Serializable, None);
    assert!(report.anomalies.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert!(report.complete, "warnings do not mark the report incomplete");
}

/// Inconsistent reads exclude the object and flag the report incomplete,
/// but the rest of the analysis still runs.
#[test]
fn version_conflict_degrades_gracefully() {
    let h = hist(vec![
        txn!(1 => committed [w(x, 1)]),
        txn!(2 => committed [w(x, 2)]),
        txn!(3 => committed [r(x, 1), r(x, 2)]),
        txn!(4 => committed [r(x, 2), r(x, 1)]),
        // An unrelated aborted read must still surface.
        txn!(5 => aborted [w(y, 9)]),
        txn!(6 => committed [r(y, 9)]),
    ]);

    let report = check(&h, IsolationLevel::Serializable, None);
    assert!(!report.complete);
    assert!(!report.integrity.is_empty());
    assert!(report
        .anomalies
        .iter()
        .any(|a| a.kind() == adya_core::AnomalyKind::G1a));
}

/// The same (history, level) pair always yields the same report, at every
/// level.
#[test]
fn reports_are_deterministic_per_level() {
    let build = || {
        hist(vec![
            txn!(0 => committed [w(x, 0), w(y, 0)]),
            txn!(1 => committed [r(x, 0), w(y, 1)]),
            txn!(2 => committed [r(y, 0), w(x, 1)]),
            txn!(3 => aborted [w(z, 3)]),
            txn!(4 => committed [r(z, 3)]),
        ])
    };
    for level in IsolationLevel::ALL {
        let reference = format!("{:?}", check(&build(), level, None).anomalies);
        for _ in 0..3 {
            assert_eq!(format!("{:?}", check(&build(), level, None).anomalies), reference);
        }
    }
}
