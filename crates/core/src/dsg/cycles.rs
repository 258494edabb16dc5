//! Simple-cycle enumeration over the DSG.
//!
//! The graph is first decomposed into strongly connected components; only
//! components of size two or more can carry cycles (the builder never emits
//! self-loops). Within a component, cycles are enumerated by a depth-first
//! search rooted at each vertex in ascending order and restricted to
//! vertices no smaller than the root, so every simple cycle is produced
//! exactly once and already in canonical rotation: smallest transaction
//! first, direction preserved. Neighbor exploration is ascending, making
//! the whole enumeration lexicographic and deterministic.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::hash::Hash;

use crate::dsg::Dsg;
use crate::graph::digraph::DiGraph;
use crate::history::types::TxnId;

/// Calls `sink` with every simple cycle, in canonical form, until the sink
/// returns `false` or the graph is exhausted.
pub fn enumerate<Variable, F>(dsg: &Dsg<Variable>, mut sink: F)
where
    Variable: Eq + Hash + Clone + Ord,
    F: FnMut(&[TxnId]) -> bool,
{
    let mut graph: DiGraph<TxnId> = DiGraph::default();
    for &node in &dsg.nodes {
        graph.add_vertex(node);
    }
    for &(from, to) in dsg.edges.keys() {
        graph.add_edge(from, to);
    }

    for component in graph.sccs() {
        if component.len() < 2 {
            continue;
        }
        let members: BTreeSet<TxnId> = component.iter().copied().collect();
        for &root in &component {
            let mut path = Vec::new();
            let mut on_path = BTreeSet::new();
            path.push(root);
            on_path.insert(root);
            if !search(&graph, &members, root, root, &mut path, &mut on_path, &mut sink) {
                return;
            }
        }
    }
}

/// Collects every simple cycle. Convenience for tests and rendering.
#[must_use]
pub fn all_cycles<Variable>(dsg: &Dsg<Variable>) -> Vec<Vec<TxnId>>
where
    Variable: Eq + Hash + Clone + Ord,
{
    let mut cycles = Vec::new();
    enumerate(dsg, |cycle| {
        cycles.push(cycle.to_vec());
        true
    });
    cycles
}

fn search<F>(
    graph: &DiGraph<TxnId>,
    members: &BTreeSet<TxnId>,
    root: TxnId,
    current: TxnId,
    path: &mut Vec<TxnId>,
    on_path: &mut BTreeSet<TxnId>,
    sink: &mut F,
) -> bool
where
    F: FnMut(&[TxnId]) -> bool,
{
    for &next in graph.neighbors(&current) {
        if next == root {
            if path.len() >= 2 && !sink(path) {
                return false;
            }
        } else if next > root && members.contains(&next) && !on_path.contains(&next) {
            path.push(next);
            on_path.insert(next);
            let keep_going = search(graph, members, root, next, path, on_path, sink);
            path.pop();
            on_path.remove(&next);
            if !keep_going {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsg::{EdgeKind, EdgeLabel, Justification};
    use crate::history::types::OpId;
    use alloc::collections::BTreeMap;

    fn dsg_with_edges(nodes: &[u64], edges: &[(u64, u64)]) -> Dsg<&'static str> {
        let mut dsg = Dsg {
            nodes: nodes.iter().map(|&n| TxnId(n)).collect(),
            edges: BTreeMap::new(),
            version_orders: BTreeMap::new(),
            excluded: Vec::new(),
        };
        for &(from, to) in edges {
            let mut label = EdgeLabel::default();
            label.kinds.entry(EdgeKind::Ww).or_default().push(Justification {
                object: "x",
                from_op: OpId {
                    txn: TxnId(from),
                    seq: 0,
                },
                to_op: OpId {
                    txn: TxnId(to),
                    seq: 0,
                },
            });
            dsg.edges.insert((TxnId(from), TxnId(to)), label);
        }
        dsg
    }

    fn cycles(nodes: &[u64], edges: &[(u64, u64)]) -> Vec<Vec<u64>> {
        all_cycles(&dsg_with_edges(nodes, edges))
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|t| t.0).collect())
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        assert!(cycles(&[1, 2, 3], &[(1, 2), (2, 3)]).is_empty());
    }

    #[test]
    fn two_cycle_is_canonical() {
        assert_eq!(cycles(&[1, 2], &[(1, 2), (2, 1)]), vec![vec![1, 2]]);
    }

    #[test]
    fn triangle_found_once() {
        assert_eq!(
            cycles(&[1, 2, 3], &[(1, 2), (2, 3), (3, 1)]),
            vec![vec![1, 2, 3]]
        );
    }

    #[test]
    fn overlapping_cycles_all_found() {
        // 1->2->1 and 1->2->3->1 share the edge 1->2.
        assert_eq!(
            cycles(&[1, 2, 3], &[(1, 2), (2, 1), (2, 3), (3, 1)]),
            vec![vec![1, 2], vec![1, 2, 3]]
        );
    }

    #[test]
    fn disjoint_components_enumerate_in_order() {
        assert_eq!(
            cycles(&[1, 2, 3, 4], &[(3, 4), (4, 3), (1, 2), (2, 1)]),
            vec![vec![1, 2], vec![3, 4]]
        );
    }

    #[test]
    fn sink_can_stop_enumeration() {
        let dsg = dsg_with_edges(&[1, 2, 3, 4], &[(1, 2), (2, 1), (3, 4), (4, 3)]);
        let mut seen = 0;
        enumerate(&dsg, |_| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);
    }
}
