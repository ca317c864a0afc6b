//! nctrl batch runner
//!
//! Loads a study configuration and subject manifest, runs the control-energy
//! batch and writes the output tables and per-subject archives.
//!
//! Output layout (under `--out`):
//! - baseline_energy.csv, perturbed_energy.csv
//! - rerc.csv, subject_rerc.csv, group_rerc.csv
//! - subject_summary.csv, failures.csv
//! - archives/<subject>.nce

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nctrl::batch::{run_batch, SubjectReport};
use nctrl::exec::CancelToken;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod error;
mod paths;
mod study;
mod tables;

use error::{RunError, RunResult};
use paths::OutputPaths;
use study::{load_subjects, Manifest, StudyConfig};

/// Batch runner for network control energy studies
#[derive(Parser)]
#[command(name = "nctrl-run")]
#[command(version = "0.1.0")]
#[command(about = "Minimum control energy and rERC for a cohort of structural connectomes")]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the batch for every subject of a manifest
    Run {
        /// Study configuration (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Subject manifest (JSON)
        #[arg(long)]
        manifest: PathBuf,
        /// Output directory
        #[arg(long, default_value = "nctrl_out")]
        out: PathBuf,
    },
    /// Summarize a per-subject archive
    Inspect {
        /// Archive written by `run`
        archive: PathBuf,
        /// Study configuration used to recompute derived values
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            manifest,
            out,
        } => run(config, manifest, out).await,
        Commands::Inspect { archive, config } => inspect(archive, config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: PathBuf, manifest: PathBuf, out: PathBuf) -> RunResult<ExitCode> {
    let study = StudyConfig::load(&config)?;
    let manifest = Manifest::load(&manifest)?;
    let subjects = load_subjects(&study, &manifest)?;
    let paths = OutputPaths::create(out)?;

    // Ctrl-C stops dispatching new work; finished items are still written.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C: cancelling remaining items");
                cancel.cancel();
            }
        });
    }

    let cfg = study.run.clone();
    let report = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || run_batch(&subjects, &cfg, &cancel)).await??
    };

    tables::write_report(&paths, &report)?;

    let warned = report
        .subjects
        .iter()
        .filter(|s| s.warning.is_some())
        .count();
    info!(
        subjects = report.subjects.len(),
        items = report.items(),
        failures = report.failures().len(),
        warned,
        "done"
    );

    if report.cancelled {
        warn!("run was cancelled; missing items are recorded as Cancelled");
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct ArchiveSummary {
    subject: String,
    group: Option<String>,
    regions: usize,
    states: Vec<String>,
    pairs: usize,
    computed_baseline: usize,
    computed_perturbed: usize,
    ave_te: Option<f64>,
    ave_pe: Option<f64>,
    stability: Option<f64>,
    failures_by_reason: BTreeMap<String, usize>,
    warning: Option<String>,
}

impl ArchiveSummary {
    fn new(report: &SubjectReport) -> Self {
        let mut failures_by_reason = BTreeMap::new();
        for f in &report.failures {
            *failures_by_reason.entry(f.reason.to_string()).or_insert(0) += 1;
        }
        Self {
            subject: report.subject.clone(),
            group: report.group.clone(),
            regions: report.regions,
            states: report.state_labels.clone(),
            pairs: report.pairs.len(),
            computed_baseline: report.baseline.iter().flatten().count(),
            computed_perturbed: report.perturbed.iter().flatten().flatten().count(),
            ave_te: report.summary.ave_transition,
            ave_pe: report.summary.ave_persistence,
            stability: report.summary.stability,
            failures_by_reason,
            warning: report.warning.clone(),
        }
    }
}

fn inspect(archive: PathBuf, config: PathBuf) -> RunResult<ExitCode> {
    let study = StudyConfig::load(&config)?;
    let file = File::open(&archive).map_err(|e| RunError::io(&archive, e))?;
    let report = SubjectReport::load_archive_from(&mut BufReader::new(file), &study.run)
        .map_err(|e| RunError::io(&archive, e))?;

    let summary = ArchiveSummary::new(&report);
    let json = serde_json::to_string_pretty(&summary).map_err(|e| RunError::json(&archive, e))?;
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}
