//! History analysis engine.
//!
//! Takes an immutable record of a transactional workload and reports the
//! Adya anomalies (G0, G1a, G1b, G1c, G-single, G2-item, G2) it exhibits
//! under a requested isolation level. Purely sequential and deterministic:
//! the same history and level always produce the same report.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod anomaly;
pub mod dot;
pub mod dsg;
pub mod graph;
pub mod history;
pub mod noncycle;
pub mod resolve;

pub use anomaly::{check, Anomaly, AnomalyKind, IsolationLevel, Report};
