use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Subcommand};
use cvlab_core::checkpoint::auto_commit_for_latest_event;
use cvlab_core::experiment::Experiment;
use cvlab_core::util::env_bool;
use cvlab_core::{LabContext, ShellRunner, TrainingMode};
use serde_json::{Map, Value};

use super::util::print_json;

#[derive(Subcommand)]
pub enum ExperimentCmd {
    /// Register an externally trained artifact as a new experiment run
    Register(RegisterArgs),
}

#[derive(Args)]
pub struct RegisterArgs {
    /// Team member who ran the training
    #[arg(long)]
    member: String,
    /// Training mode (dev or full)
    #[arg(long, default_value = "dev")]
    mode: TrainingMode,
    /// JSON object with the run's metrics; must contain val_accuracy
    #[arg(long)]
    metrics: PathBuf,
    /// Trained model file to copy into the run directory
    #[arg(long)]
    artifact: PathBuf,
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, cmd: ExperimentCmd) -> Result<()> {
    match cmd {
        ExperimentCmd::Register(args) => register(ctx, args),
    }
}

fn register(ctx: &LabContext, args: RegisterArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.metrics)
        .with_context(|| format!("reading metrics {}", args.metrics.display()))?;
    let metrics: Map<String, Value> = serde_json::from_str(&raw)
        .with_context(|| format!("metrics {} must be a JSON object", args.metrics.display()))?;

    let mut run = Experiment::begin(&ctx.paths, &args.member, args.mode)?;
    let exp_id = run.exp_id().to_string();
    run.record_metrics(metrics)
        .with_context(|| format!("recording metrics for {exp_id}"))?;
    run.save_artifact(&args.artifact)
        .with_context(|| format!("saving artifact for {exp_id}"))?;
    let record = run
        .finalize(&ctx.paths)
        .with_context(|| format!("finalizing {exp_id}"))?;
    print_json(&record, args.pretty)?;

    if env_bool("CVLAB_AUTO_CHECKPOINT").unwrap_or(false) {
        let runner = ShellRunner::new(&ctx.paths.root);
        match auto_commit_for_latest_event(&ctx.paths.journal(), &runner, Local::now()) {
            Ok(outcome) => tracing::info!(?outcome, "auto checkpoint after registration"),
            Err(err) => tracing::warn!("auto checkpoint failed: {err}"),
        }
    }
    Ok(())
}
