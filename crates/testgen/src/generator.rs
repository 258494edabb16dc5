use std::collections::HashMap;

use adya_core::history::types::Predicate;
use adya_core::history::History;
use adya_core::IsolationLevel;
use chrono::{DateTime, Duration, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Predicate-write values come from their own range so they can never
/// collide with the per-object counters that back point writes.
const PREDICATE_WRITE_BASE: u64 = 1_000_000_000;

/// Parameters of one workload run.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, TypedBuilder)]
pub struct WorkloadParams {
    pub seed: u64,
    /// Size of the concurrent transaction pool (excluding the brackets).
    #[builder(default = 100)]
    pub transactions: u64,
    #[builder(default = 16)]
    pub objects: u64,
    /// Number of database connections the executor drives in parallel.
    #[builder(default = 5)]
    pub connections: usize,
    #[builder(default = 0.33)]
    pub write_rate: f64,
    #[builder(default = 0.15)]
    pub abort_rate: f64,
    #[builder(default = 0.10)]
    pub predicate_read_rate: f64,
    /// Chance that a write step becomes a predicate write instead.
    #[builder(default = 0.05)]
    pub predicate_write_rate: f64,
    #[builder(default = 3)]
    pub min_ops: u64,
    #[builder(default = 10)]
    pub max_ops: u64,
    /// Isolation level the workload runs under.
    #[builder(default = IsolationLevel::ReadCommitted)]
    pub isolation: IsolationLevel,
}

/// Parameter validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidParams {
    /// A rate lies outside `[0, 1]`, or the write rates sum past 1.
    Rate(&'static str),
    /// At least one object is required.
    NoObjects,
    /// At least one connection is required.
    NoConnections,
    /// `min_ops` must not exceed `max_ops`, and `max_ops` must be positive.
    OpsRange,
}

impl std::fmt::Display for InvalidParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Rate(name) => write!(f, "{name} must lie in [0, 1] and sum to at most 1"),
            Self::NoObjects => write!(f, "need at least one object"),
            Self::NoConnections => write!(f, "need at least one connection"),
            Self::OpsRange => write!(f, "ops range must be non-empty"),
        }
    }
}

impl std::error::Error for InvalidParams {}

impl WorkloadParams {
    /// Checks the parameters before planning.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidParams`] violation.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.write_rate) {
            return Err(InvalidParams::Rate("write_rate"));
        }
        if !in_unit(self.abort_rate) {
            return Err(InvalidParams::Rate("abort_rate"));
        }
        if !in_unit(self.predicate_read_rate) {
            return Err(InvalidParams::Rate("predicate_read_rate"));
        }
        if !in_unit(self.predicate_write_rate) {
            return Err(InvalidParams::Rate("predicate_write_rate"));
        }
        if !in_unit(self.write_rate + self.predicate_read_rate) {
            return Err(InvalidParams::Rate("write_rate + predicate_read_rate"));
        }
        if self.objects == 0 {
            return Err(InvalidParams::NoObjects);
        }
        if self.connections == 0 {
            return Err(InvalidParams::NoConnections);
        }
        if self.min_ops > self.max_ops || self.max_ops == 0 {
            return Err(InvalidParams::OpsRange);
        }
        Ok(())
    }
}

/// One operation the executor will issue. Observations are filled in at
/// execution time.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum PlannedOp {
    Read { object: u64 },
    Write { object: u64, value: u64 },
    PredicateRead { predicate: Predicate<u64> },
    PredicateWrite { predicate: Predicate<u64>, value: u64 },
}

/// How a planned transaction ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Termination {
    Commit,
    Rollback,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlannedTransaction {
    pub id: u64,
    pub ops: Vec<PlannedOp>,
    pub termination: Termination,
}

/// A full workload: the initial bracket writes every object's first value
/// without concurrency, the pool runs concurrently, and the final bracket
/// reads everything back, again alone.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WorkloadPlan {
    pub params: WorkloadParams,
    pub init: PlannedTransaction,
    pub pool: Vec<PlannedTransaction>,
    pub fin: PlannedTransaction,
}

/// Plans a workload. Deterministic for a given seed: every generated point
/// write carries a value unique to its object, so a recorded observation
/// always identifies its producing write.
///
/// # Errors
///
/// Returns [`InvalidParams`] when the parameters are out of range.
pub fn plan(params: &WorkloadParams) -> Result<WorkloadPlan, InvalidParams> {
    params.validate()?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut counters: HashMap<u64, u64> = HashMap::new();
    let mut predicate_values = PREDICATE_WRITE_BASE;
    let mut total_writes: u64 = 0;

    let init = PlannedTransaction {
        id: 0,
        ops: (0..params.objects)
            .map(|object| PlannedOp::Write { object, value: 0 })
            .collect(),
        termination: Termination::Commit,
    };

    let mut pool = Vec::with_capacity(params.transactions as usize);
    for id in 1..=params.transactions {
        let size = rng.random_range(params.min_ops..=params.max_ops);
        // Average per-object version at this point in the plan; predicate
        // thresholds hover around it so match sets stay small and
        // anti-dependencies likely.
        let average_version = total_writes / params.objects;
        let mut ops = Vec::new();
        for _ in 0..size {
            let roll: f64 = rng.random();
            if roll < params.write_rate {
                if rng.random::<f64>() < params.predicate_write_rate {
                    predicate_values += 1;
                    ops.push(PlannedOp::PredicateWrite {
                        predicate: skewed_threshold(&mut rng, average_version),
                        value: predicate_values,
                    });
                } else {
                    // Read-modify-write, the workload's conflict engine.
                    let object = rng.random_range(0..params.objects);
                    let value = {
                        let counter = counters.entry(object).or_default();
                        *counter += 1;
                        *counter
                    };
                    total_writes += 1;
                    ops.push(PlannedOp::Read { object });
                    ops.push(PlannedOp::Write { object, value });
                }
            } else if roll < params.write_rate + params.predicate_read_rate {
                ops.push(PlannedOp::PredicateRead {
                    predicate: skewed_threshold(&mut rng, average_version),
                });
            } else {
                ops.push(PlannedOp::Read {
                    object: rng.random_range(0..params.objects),
                });
            }
        }
        let termination = if rng.random::<f64>() < params.abort_rate {
            Termination::Rollback
        } else {
            Termination::Commit
        };
        pool.push(PlannedTransaction {
            id,
            ops,
            termination,
        });
    }

    let fin = PlannedTransaction {
        id: params.transactions + 1,
        ops: (0..params.objects)
            .map(|object| PlannedOp::Read { object })
            .collect(),
        termination: Termination::Commit,
    };

    Ok(WorkloadPlan {
        params: params.clone(),
        init,
        pool,
        fin,
    })
}

/// A `GreaterThan` threshold around the current average version, skewed so
/// predicate reads tend to return little.
fn skewed_threshold(rng: &mut StdRng, average_version: u64) -> Predicate<u64> {
    let low = average_version.saturating_mul(85) / 100;
    let high = (average_version.saturating_mul(135) / 100).max(low + 1);
    Predicate::GreaterThan(rng.random_range(low..=high))
}

/// A recorded run: the history plus everything needed to reproduce and
/// interpret it. This is the JSON document `generate` writes and `check`
/// reads.
#[derive(Debug, Deserialize, Serialize)]
pub struct RecordedHistory {
    pub params: WorkloadParams,
    pub info: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub history: History<u64, u64>,
}

impl RecordedHistory {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
