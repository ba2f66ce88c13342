use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::inference::{FileArtifactStore, InferenceService};
use cvlab_core::LabContext;
use serde_json::json;

use super::util::print_json;

#[derive(Subcommand)]
pub enum ServeCmd {
    /// Resolve and load the production artifact; fails when it cannot be served
    Check(ServeCheckArgs),
}

#[derive(Args)]
pub struct ServeCheckArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, cmd: ServeCmd) -> Result<()> {
    match cmd {
        ServeCmd::Check(args) => {
            let store = ctx.paths.registry();
            let registry = store
                .load()
                .with_context(|| format!("reading {}", store.path().display()))?;
            let service = InferenceService::open(&registry, &ctx.paths, &FileArtifactStore)
                .context("production model cannot be served")?;
            print_json(
                &json!({
                    "exp_id": service.record().exp_id,
                    "val_accuracy": service.record().val_accuracy,
                    "artifact": service.artifact_path(),
                }),
                args.pretty,
            )
        }
    }
}
