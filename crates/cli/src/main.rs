use std::{fs, process};

use adya_cli::{
    parse_level, parse_nodes, App, CheckArgs, Command, Engine, GenerateArgs, TestIsolationArgs,
    WorkloadArgs,
};
use adya_core::{IsolationLevel, Report};
use adya_drivers::mysql::MySqlAdapter;
use adya_drivers::postgres::PostgresAdapter;
use adya_drivers::{execute, ClusterConfig, MemoryCluster, NoopNemesis};
use adya_testgen::{plan, RecordedHistory, WorkloadParams};
use clap::Parser;
use rand::Rng;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let app = App::parse();
    let code = match &app.command {
        Command::Generate(args) => generate(args),
        Command::Check(args) => check(args),
        Command::TestIsolation(args) => test_isolation(args),
    };
    process::exit(code);
}

fn generate(args: &GenerateArgs) -> i32 {
    let recorded = match run_workload(&args.workload, &args.isolation) {
        Ok(recorded) => recorded,
        Err(message) => {
            eprintln!("{message}");
            return 1;
        }
    };

    if let Err(message) = write_history(&recorded, &args.output) {
        eprintln!("{message}");
        return 1;
    }

    println!(
        "recorded {} transactions (seed {}) to {}",
        recorded.history.transactions().count(),
        recorded.params.seed,
        args.output.display()
    );
    0
}

fn check(args: &CheckArgs) -> i32 {
    let level = match args.isolation.as_deref().map(parse_level).transpose() {
        Ok(level) => level.unwrap_or(IsolationLevel::Serializable),
        Err(message) => {
            eprintln!("{message}");
            return 1;
        }
    };

    let file = match fs::File::open(&args.history) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("failed to open {}: {e}", args.history.display());
            return 1;
        }
    };
    let recorded: RecordedHistory = match serde_json::from_reader(file) {
        Ok(recorded) => recorded,
        Err(e) => {
            eprintln!("failed to parse {}: {e}", args.history.display());
            return 1;
        }
    };

    let report = adya_core::check(&recorded.history, level, args.limit);
    print_report(&report);

    if let Some(path) = &args.graph {
        let dot = adya_core::dot::render_report(&recorded.history, &report);
        if let Err(e) = fs::write(path, dot) {
            eprintln!("failed to write {}: {e}", path.display());
            return 1;
        }
    }

    i32::from(args.fail_on_anomaly && !report.anomalies.is_empty())
}

fn test_isolation(args: &TestIsolationArgs) -> i32 {
    let target = args.target_isolation.as_deref().unwrap_or(&args.isolation);
    let level = match parse_level(target) {
        Ok(level) => level,
        Err(message) => {
            eprintln!("{message}");
            return 1;
        }
    };

    let recorded = match run_workload(&args.workload, &args.isolation) {
        Ok(recorded) => recorded,
        Err(message) => {
            eprintln!("{message}");
            return 1;
        }
    };

    if let Some(path) = &args.output {
        if let Err(message) = write_history(&recorded, path) {
            eprintln!("{message}");
            return 1;
        }
    }

    let report = adya_core::check(&recorded.history, level, args.limit);
    print_report(&report);
    0
}

/// Plans and executes a workload against the configured cluster.
fn run_workload(args: &WorkloadArgs, isolation: &str) -> Result<RecordedHistory, String> {
    let level = parse_level(isolation)?;
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let params = WorkloadParams::builder()
        .seed(seed)
        .transactions(args.transactions)
        .objects(args.objects)
        .connections(args.connections)
        .write_rate(args.write_rate)
        .abort_rate(args.abort_rate)
        .predicate_read_rate(args.predicate_read_rate)
        .predicate_write_rate(args.predicate_write_rate)
        .isolation(level)
        .build();
    let planned = plan(&params).map_err(|e| format!("invalid workload: {e}"))?;

    let (engine, addresses) = parse_nodes(&args.nodes)?;
    match engine {
        Engine::Memory => {
            let cluster = MemoryCluster::new();
            let adapters = cluster.connections(args.connections);
            execute(&planned, adapters, NoopNemesis).map_err(|e| e.to_string())
        }
        Engine::MySql => {
            let config = ClusterConfig {
                nodes: addresses,
                connections: args.connections,
            };
            let adapters = (0..args.connections)
                .map(|_| MySqlAdapter::connect(&config))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("failed to connect: {e:?}"))?;
            execute(&planned, adapters, NoopNemesis).map_err(|e| e.to_string())
        }
        Engine::Postgres => {
            let config = ClusterConfig {
                nodes: addresses,
                connections: args.connections,
            };
            let adapters = (0..args.connections)
                .map(|_| PostgresAdapter::connect(&config))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("failed to connect: {e:?}"))?;
            execute(&planned, adapters, NoopNemesis).map_err(|e| e.to_string())
        }
    }
}

fn write_history(recorded: &RecordedHistory, path: &std::path::Path) -> Result<(), String> {
    let file = fs::File::create(path)
        .map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    serde_json::to_writer_pretty(file, recorded)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// One line per anomaly, then a summary.
fn print_report(report: &Report<u64, u64>) {
    for error in &report.integrity {
        eprintln!("integrity: {error}");
    }
    for read in &report.unresolved {
        tracing::warn!(txn = read.op.txn.0, seq = read.op.seq, "read with unknown provenance");
    }
    for anomaly in &report.anomalies {
        println!("{anomaly}");
    }
    println!(
        "{} {} under {}{}",
        report.anomalies.len(),
        if report.anomalies.len() == 1 {
            "anomaly"
        } else {
            "anomalies"
        },
        report.level,
        if report.complete { "" } else { " (incomplete)" }
    );
}
