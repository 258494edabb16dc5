//! Drives a planned workload over a set of adapters and records the history.
//!
//! The initial bracket transaction runs alone on the first connection, the
//! concurrent pool is pulled from a shared queue by one worker thread per
//! adapter, and the final bracket runs alone once the workers drain. The
//! nemesis loops on its own thread for the duration of the pool and heals
//! before the final bracket. Adapter failures mid-transaction are not
//! errors: the executor records what it observed and moves on.

use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use adya_core::history::error::HistoryError;
use adya_core::history::types::{Operation, Outcome, Transaction};
use adya_core::history::History;
use adya_core::IsolationLevel;
use adya_testgen::{PlannedOp, PlannedTransaction, RecordedHistory, Termination, WorkloadPlan};
use chrono::Local;

use crate::{DbAdapter, Nemesis, Observed};

/// Executor failure. Adapter errors inside transactions are recorded in the
/// history instead; only structural problems surface here.
#[derive(Debug)]
pub enum ExecError {
    /// No adapters were supplied.
    NoAdapters,
    /// The recorded transactions do not form a valid history.
    InvalidHistory(HistoryError),
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::NoAdapters => write!(f, "need at least one adapter"),
            Self::InvalidHistory(e) => write!(f, "recorded an invalid history: {e}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// Executes `plan` over the given adapters, disturbed by `nemesis`.
///
/// # Errors
///
/// Returns [`ExecError`] when no adapters are supplied or the recorded
/// transactions fail validation.
pub fn execute<A, N>(
    plan: &WorkloadPlan,
    mut adapters: Vec<A>,
    mut nemesis: N,
) -> Result<RecordedHistory, ExecError>
where
    A: DbAdapter + Send,
    N: Nemesis + Send,
{
    if adapters.is_empty() {
        return Err(ExecError::NoAdapters);
    }
    let start = Local::now();
    let isolation = plan.params.isolation;

    tracing::info!(
        transactions = plan.pool.len(),
        connections = adapters.len(),
        isolation = %isolation,
        "starting workload"
    );

    let mut transactions = Vec::with_capacity(plan.pool.len() + 2);
    transactions.push(run_txn(&mut adapters[0], &plan.init, isolation));

    let queue: Mutex<VecDeque<&PlannedTransaction>> = Mutex::new(plan.pool.iter().collect());
    let results: Mutex<Vec<Transaction<u64, u64>>> = Mutex::new(Vec::new());
    let drained = AtomicBool::new(false);

    thread::scope(|scope| {
        let queue = &queue;
        let results = &results;
        let drained = &drained;

        let workers: Vec<_> = adapters
            .iter_mut()
            .enumerate()
            .map(|(worker, adapter)| {
                scope.spawn(move || {
                    loop {
                        let next = lock_clean(queue).pop_front();
                        let Some(planned) = next else { break };
                        tracing::debug!(worker, txn = planned.id, "executing transaction");
                        let recorded = run_txn(adapter, planned, isolation);
                        lock_clean(results).push(recorded);
                    }
                    tracing::debug!(worker, "worker drained");
                })
            })
            .collect();

        let nemesis_thread = scope.spawn({
            let nemesis = &mut nemesis;
            move || {
                while !drained.load(Ordering::Relaxed) {
                    nemesis.inject();
                }
                tracing::info!("healing after workload");
                nemesis.heal();
            }
        });

        for worker in workers {
            let _ = worker.join();
        }
        drained.store(true, Ordering::Relaxed);
        let _ = nemesis_thread.join();
    });

    transactions.append(&mut lock_clean(&results));
    transactions.push(run_txn(&mut adapters[0], &plan.fin, isolation));

    for adapter in adapters {
        adapter.close();
    }

    let history = History::new(transactions).map_err(ExecError::InvalidHistory)?;
    tracing::info!("workload finished");

    Ok(RecordedHistory {
        params: plan.params.clone(),
        info: String::from("recorded by the in-process executor"),
        start,
        end: Local::now(),
        history,
    })
}

/// Runs one planned transaction to completion on one adapter. Never fails:
/// adapter errors end the transaction with an aborted or unknown outcome.
fn run_txn<A: DbAdapter>(
    adapter: &mut A,
    planned: &PlannedTransaction,
    isolation: IsolationLevel,
) -> Transaction<u64, u64> {
    let start_us = stamp_us();
    let mut ops: Vec<Operation<u64, u64>> = Vec::new();

    if let Err(error) = adapter.begin(isolation) {
        tracing::warn!(txn = planned.id, ?error, "begin failed");
        return finish(planned.id, ops, Outcome::Aborted, start_us);
    }

    for op in &planned.ops {
        match adapter.execute(op) {
            Ok(observed) => ops.push(record(op, observed)),
            Err(error) => {
                tracing::warn!(txn = planned.id, ?error, "operation failed, rolling back");
                let outcome = match adapter.rollback() {
                    Ok(()) => Outcome::Aborted,
                    Err(_) => Outcome::Unknown,
                };
                return finish(planned.id, ops, outcome, start_us);
            }
        }
    }

    let outcome = match planned.termination {
        Termination::Commit => adapter.commit().unwrap_or(Outcome::Unknown),
        Termination::Rollback => match adapter.rollback() {
            Ok(()) => Outcome::Aborted,
            Err(_) => Outcome::Unknown,
        },
    };
    finish(planned.id, ops, outcome, start_us)
}

fn finish(
    id: u64,
    ops: Vec<Operation<u64, u64>>,
    outcome: Outcome,
    start_us: u64,
) -> Transaction<u64, u64> {
    let mut txn = Transaction::committed(id, ops);
    txn.outcome = outcome;
    txn.start_us = Some(start_us);
    txn.commit_us = (outcome == Outcome::Committed).then(stamp_us);
    txn
}

/// Pairs a planned operation with its observation. A mismatched observation
/// is an adapter bug; it is logged and recorded as the emptiest faithful
/// form so the analysis can still run.
fn record(op: &PlannedOp, observed: Observed) -> Operation<u64, u64> {
    match (op, observed) {
        (PlannedOp::Read { object }, Observed::Row(value)) => Operation::Read {
            object: *object,
            observed: value,
        },
        (PlannedOp::Write { object, value }, _) => Operation::write(*object, *value),
        (PlannedOp::PredicateRead { predicate }, Observed::Rows(rows)) => {
            Operation::predicate_read(*predicate, rows)
        }
        (PlannedOp::PredicateWrite { predicate, value }, Observed::Updated(updated)) => {
            Operation::predicate_write(*predicate, *value, updated)
        }
        (op, observed) => {
            tracing::error!(?op, ?observed, "adapter returned a mismatched observation");
            match op {
                PlannedOp::Read { object } => Operation::read_absent(*object),
                PlannedOp::PredicateRead { predicate } => {
                    Operation::predicate_read(*predicate, Vec::new())
                }
                PlannedOp::PredicateWrite { predicate, value } => {
                    Operation::predicate_write(*predicate, *value, Vec::new())
                }
                PlannedOp::Write { .. } => unreachable!("writes are matched above"),
            }
        }
    }
}

fn stamp_us() -> u64 {
    u64::try_from(Local::now().timestamp_micros()).unwrap_or(0)
}

fn lock_clean<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
