//! Portable graph rendering.
//!
//! Emits DOT: one node per committed transaction, one drawn edge per
//! dependency kind per transaction pair. WW and WR dependencies are solid,
//! RW and PRW anti-dependencies dashed (Adya's convention). Nodes on a
//! reported anomaly are emphasized. Output is byte-deterministic for a
//! given history.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Display, Write};
use core::hash::Hash;

use crate::anomaly::Report;
use crate::dsg::{Dsg, EdgeKind, EdgeLabel, ALL_EDGE_KINDS};
use crate::history::types::TxnId;
use crate::history::History;
use crate::resolve;

/// Renders the whole DSG, emphasizing `highlight` nodes.
#[must_use]
pub fn render_dsg<Variable>(dsg: &Dsg<Variable>, highlight: &BTreeSet<TxnId>) -> String
where
    Variable: Display + Ord,
{
    render_edges(
        dsg.nodes.iter().copied(),
        dsg.edges.iter().map(|(&pair, label)| (pair, label)),
        highlight,
    )
}

/// Renders one cycle: the nodes on it and every dependency among them.
#[must_use]
pub fn render_cycle<Variable>(dsg: &Dsg<Variable>, cycle: &[TxnId]) -> String
where
    Variable: Display + Ord,
{
    let members: BTreeSet<TxnId> = cycle.iter().copied().collect();
    render_edges(
        cycle.iter().copied(),
        dsg.edges
            .iter()
            .filter(|((from, to), _)| members.contains(from) && members.contains(to))
            .map(|(&pair, label)| (pair, label)),
        &members,
    )
}

/// Resolves and renders the full DSG of a history, emphasizing every
/// transaction implicated in the report's anomalies.
#[must_use]
pub fn render_report<Variable, Value>(
    history: &History<Variable, Value>,
    report: &Report<Variable, Value>,
) -> String
where
    Variable: Eq + Hash + Clone + Ord + Display,
    Value: Eq + Clone + Ord,
{
    let resolution = resolve::resolve(history);
    let (dsg, _) = Dsg::build(history, &resolution, &ALL_EDGE_KINDS);
    let mut highlight = BTreeSet::new();
    for anomaly in &report.anomalies {
        highlight.extend(anomaly.participants());
    }
    render_dsg(&dsg, &highlight)
}

fn render_edges<'a, Variable, N, E>(nodes: N, edges: E, highlight: &BTreeSet<TxnId>) -> String
where
    Variable: Display + Ord + 'a,
    N: Iterator<Item = TxnId>,
    E: Iterator<Item = ((TxnId, TxnId), &'a EdgeLabel<Variable>)>,
{
    let mut out = String::new();
    let _ = writeln!(out, "digraph dsg {{");
    for node in nodes {
        if highlight.contains(&node) {
            let _ = writeln!(out, "\t{node} [penwidth=2];");
        } else {
            let _ = writeln!(out, "\t{node};");
        }
    }

    let mut solid: Vec<String> = Vec::new();
    let mut dashed: Vec<String> = Vec::new();
    for ((from, to), label) in edges {
        for (&kind, justifications) in &label.kinds {
            let mut line = String::new();
            let _ = write!(line, "\t{from} -> {to} [label=\"{kind}(");
            if let Some(just) = justifications.first() {
                let _ = write!(line, "{}: {} > {}", just.object, just.from_op, just.to_op);
            }
            let _ = write!(line, ")\"];");
            if kind.is_anti() {
                dashed.push(line);
            } else {
                solid.push(line);
            }
        }
    }

    for line in solid {
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out, "\tedge [style=dashed];");
    for line in dashed {
        let _ = writeln!(out, "{line}");
    }
    let _ = writeln!(out, "}}");
    out
}
