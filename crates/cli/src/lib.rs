//! adya CLI -- generate transactional histories and check them for Adya
//! anomalies.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "adya",
    about = "Black-box isolation checker for transactional databases"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a workload against a database and record its history
    Generate(GenerateArgs),
    /// Check a recorded history against an isolation level
    Check(CheckArgs),
    /// Run a workload and check the recorded history in one go
    TestIsolation(TestIsolationArgs),
}

/// Options shared by the workload-running subcommands.
#[derive(Debug, Args)]
pub struct WorkloadArgs {
    /// Number of transactions in the concurrent pool
    #[arg(short = 't', long = "transactions", default_value_t = 100)]
    pub transactions: u64,
    /// Number of objects the workload targets
    #[arg(short = 'n', long = "objects", default_value_t = 16)]
    pub objects: u64,
    /// Database nodes as host:port, or `mem` for the in-process store
    #[arg(long, value_delimiter = ',', default_value = "mem")]
    pub nodes: Vec<String>,
    /// Connections to spread across the nodes
    #[arg(short = 'c', long, default_value_t = 5)]
    pub connections: usize,
    /// Seed for the workload planner (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Fraction of steps that read-modify-write an object
    #[arg(long, default_value_t = 0.33)]
    pub write_rate: f64,
    /// Fraction of transactions that roll back
    #[arg(long, default_value_t = 0.15)]
    pub abort_rate: f64,
    /// Fraction of steps that issue a predicate read
    #[arg(long, default_value_t = 0.10)]
    pub predicate_read_rate: f64,
    /// Fraction of write steps that become predicate writes
    #[arg(long, default_value_t = 0.05)]
    pub predicate_write_rate: f64,
}

/// Database engine behind a node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Memory,
    MySql,
    Postgres,
}

/// Resolves the node list to one engine and the scheme-less addresses.
///
/// `mem` selects the in-process store. `host:port` entries may carry a
/// `mysql://` or `postgres://` scheme; bare entries default to MySQL. All
/// entries must agree on one engine.
///
/// # Errors
///
/// Returns a user-facing message when the list is empty or mixes engines.
pub fn parse_nodes(nodes: &[String]) -> Result<(Engine, Vec<String>), String> {
    let mut engine: Option<Engine> = None;
    let mut addresses = Vec::new();
    if nodes.is_empty() {
        return Err(String::from("need at least one node"));
    }
    for node in nodes {
        let (node_engine, address) = engine_of(node);
        if engine.is_some_and(|e| e != node_engine) {
            return Err(format!(
                "nodes must agree on one engine; {node:?} does not match the others"
            ));
        }
        engine = Some(node_engine);
        if node_engine != Engine::Memory {
            addresses.push(String::from(address));
        }
    }
    Ok((engine.expect("node list is non-empty"), addresses))
}

fn engine_of(node: &str) -> (Engine, &str) {
    if node == "mem" {
        (Engine::Memory, node)
    } else if let Some(address) = node.strip_prefix("mysql://") {
        (Engine::MySql, address)
    } else if let Some(address) = node
        .strip_prefix("postgres://")
        .or_else(|| node.strip_prefix("postgresql://"))
    {
        (Engine::Postgres, address)
    } else {
        (Engine::MySql, node)
    }
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub workload: WorkloadArgs,
    /// Isolation level to run the workload under (case-insensitive)
    pub isolation: String,
    /// Output file for the recorded history (JSON)
    pub output: PathBuf,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Exit non-zero when anomalies are found
    #[arg(short = 't', long = "fail-on-anomaly")]
    pub fail_on_anomaly: bool,
    /// Isolation level to check against (default: serializable)
    #[arg(short = 'i', long = "isolation")]
    pub isolation: Option<String>,
    /// Report at most this many anomalies
    #[arg(short = 'l', long = "limit")]
    pub limit: Option<usize>,
    /// Write the DSG as DOT, anomalous transactions highlighted
    #[arg(short = 'g', long = "graph")]
    pub graph: Option<PathBuf>,
    /// Recorded history to check (JSON)
    pub history: PathBuf,
}

#[derive(Debug, Parser)]
pub struct TestIsolationArgs {
    #[command(flatten)]
    pub workload: WorkloadArgs,
    /// Report at most this many anomalies
    #[arg(short = 'l', long = "limit")]
    pub limit: Option<usize>,
    /// Check against this level instead of the one the workload ran under
    #[arg(short = 'i', long = "target-isolation")]
    pub target_isolation: Option<String>,
    /// Save the recorded history to this file (JSON)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Isolation level to run the workload under (case-insensitive)
    pub isolation: String,
}

/// Parses an isolation level, listing the known ones on failure.
///
/// # Errors
///
/// Returns a user-facing message naming every accepted level.
pub fn parse_level(input: &str) -> Result<adya_core::IsolationLevel, String> {
    input.parse().map_err(|_| {
        let known: Vec<&str> = adya_core::IsolationLevel::ALL
            .iter()
            .map(|level| level.name())
            .collect();
        format!(
            "unknown isolation level {input:?}; known levels: {}",
            known.join(", ")
        )
    })
}
