use anyhow::{bail, Result};
use chrono::Local;
use clap::Args;
use cvlab_core::checkpoint::{self, CheckpointOutcome};
use cvlab_core::{LabContext, ShellRunner};

#[derive(Args)]
pub struct CheckpointArgs {
    /// Commit message
    #[arg(short, long, conflicts_with = "auto")]
    pub message: Option<String>,
    /// Commit only if the latest journal event is a milestone
    #[arg(long)]
    pub auto: bool,
}

pub fn execute(ctx: &LabContext, args: CheckpointArgs) -> Result<()> {
    let runner = ShellRunner::new(&ctx.paths.root);
    let outcome = if args.auto {
        match checkpoint::auto_commit_for_latest_event(&ctx.paths.journal(), &runner, Local::now())? {
            Some(outcome) => outcome,
            None => {
                println!("Latest journal event does not call for a checkpoint");
                return Ok(());
            }
        }
    } else {
        let Some(message) = args.message else {
            bail!("pass -m <MESSAGE> or --auto");
        };
        checkpoint::checkpoint(&runner, &message)?
    };
    match outcome {
        CheckpointOutcome::NoChanges => println!("No changes to commit"),
        CheckpointOutcome::Pushed { message } => println!("Committed and pushed: {message}"),
        CheckpointOutcome::CommittedNotPushed {
            message,
            push_error,
        } => {
            println!("Committed locally: {message}");
            eprintln!("push failed (commit kept): {push_error}");
        }
    }
    Ok(())
}
