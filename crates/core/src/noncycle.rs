//! Non-cyclic anomaly detection.
//!
//! Two of Adya's anomalies need no graph at all, only the resolution map:
//!
//! - **G1a, aborted read**: a transaction observed a value written by a
//!   transaction that aborted.
//! - **G1b, intermediate read**: a transaction observed a value a committed
//!   transaction later overwrote within itself, i.e. a version that was
//!   never installed.

use alloc::vec::Vec;
use core::hash::Hash;

use crate::anomaly::Anomaly;
use crate::resolve::{Resolution, ResolvedSource};

/// Scans the resolution map for G1a and G1b witnesses, in read order.
pub fn find_noncyclic<Variable, Value>(
    resolution: &Resolution<Variable, Value>,
) -> Vec<Anomaly<Variable>>
where
    Variable: Eq + Hash + Clone + Ord,
{
    let mut anomalies = Vec::new();
    for (&read, resolved) in &resolution.reads {
        match resolved.source {
            ResolvedSource::Aborted(writer) => {
                anomalies.push(Anomaly::AbortedRead {
                    read,
                    object: resolved.object.clone(),
                    writer,
                });
            }
            ResolvedSource::CommittedIntermediate(writer) => {
                anomalies.push(Anomaly::IntermediateRead {
                    read,
                    object: resolved.object.clone(),
                    writer,
                });
            }
            _ => {}
        }
    }

    tracing::debug!(count = anomalies.len(), "scanned for non-cyclic anomalies");
    anomalies
}
