//! RbVault runner binary
//!
//! Runs two scripts in parallel against the two store sessions and writes
//! each worker's read results to its own output file.

use clap::Parser;
use rbvault::{sched, Coordinator, RunConfig, RunReport, ScriptJob};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rbvault", about = "Run two store scripts in parallel", version)]
struct Cli {
    /// Script driven by the first worker
    script1: PathBuf,

    /// Script driven by the second worker
    script2: PathBuf,

    /// Result file for the first worker
    #[arg(long)]
    output1: Option<PathBuf>,

    /// Result file for the second worker
    #[arg(long)]
    output2: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without real-time thread priorities
    #[arg(long)]
    no_realtime: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbvault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(report) => {
            tracing::info!(drained = ?report.drained, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> rbvault::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    config.apply_env()?;

    if let Some(path) = &cli.output1 {
        config.outputs[0] = path.clone();
    }
    if let Some(path) = &cli.output2 {
        config.outputs[1] = path.clone();
    }
    if cli.no_realtime {
        config.scheduling.realtime = false;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> rbvault::Result<RunReport> {
    let config = load_config(&cli)?;
    tracing::info!(
        "Running {} and {} (realtime: {})",
        cli.script1.display(),
        cli.script2.display(),
        config.scheduling.realtime
    );

    let script1 = BufReader::new(File::open(&cli.script1)?);
    let script2 = BufReader::new(File::open(&cli.script2)?);
    let output1 = BufWriter::new(File::create(&config.outputs[0])?);
    let output2 = BufWriter::new(File::create(&config.outputs[1])?);

    if config.scheduling.realtime {
        sched::apply_best_effort("coordinator", config.scheduling.coordinator_priority);
    }

    let coordinator = Coordinator::new(config.scheduling.clone());
    let report = coordinator.run([
        ScriptJob::new(script1, output1),
        ScriptJob::new(script2, output2),
    ])?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
    }

    Ok(report)
}
