//! Workload planning.
//!
//! Synthesizes the concurrent workloads the executor drives against a
//! database: a seeded, fully deterministic plan of transactions bracketed by
//! an initial writer and a final reader, plus the envelope type that couples
//! a recorded history with the parameters that produced it.

pub mod generator;

pub use generator::{
    plan, InvalidParams, PlannedOp, PlannedTransaction, RecordedHistory, Termination,
    WorkloadParams, WorkloadPlan,
};
