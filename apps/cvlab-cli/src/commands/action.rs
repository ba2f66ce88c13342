use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::actions::ExecuteOutcome;
use cvlab_core::{LabContext, ShellRunner};

use super::util::print_json;

#[derive(Subcommand)]
pub enum ActionCmd {
    /// Print the current action (JSON)
    Show(ActionShowArgs),
    /// Propose a new pending action; refused while one is outstanding
    Propose(ActionProposeArgs),
    /// Approve the pending action
    Approve,
    /// Run an approved action's commands and mark it executed
    Execute(ActionShowArgs),
}

#[derive(Args)]
pub struct ActionShowArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
pub struct ActionProposeArgs {
    /// Short title shown to the approver
    #[arg(long)]
    title: String,
    /// Why the action is needed
    #[arg(long, default_value = "")]
    reason: String,
    /// Shell command to run on execute (repeatable, run in order)
    #[arg(long = "cmd", value_name = "COMMAND", required = true)]
    commands: Vec<String>,
}

pub fn execute(ctx: &LabContext, cmd: ActionCmd) -> Result<()> {
    let queue = ctx.paths.actions();
    match cmd {
        ActionCmd::Show(args) => {
            let action = queue
                .show()
                .with_context(|| format!("reading {}", queue.path().display()))?;
            print_json(&action, args.pretty)
        }
        ActionCmd::Propose(args) => {
            if queue.propose(&args.title, &args.reason, args.commands)? {
                println!("Pending action created: {}", args.title);
            } else {
                println!("An action is already outstanding; nothing proposed");
            }
            Ok(())
        }
        ActionCmd::Approve => {
            if queue.approve()? {
                println!("Action approved");
            } else {
                println!("No pending action");
            }
            Ok(())
        }
        ActionCmd::Execute(args) => {
            let runner = ShellRunner::new(&ctx.paths.root);
            match queue.execute(&runner)? {
                ExecuteOutcome::NoAction => println!("No pending action"),
                ExecuteOutcome::NotApproved(status) => {
                    println!("Action is {status}; approve it before executing")
                }
                ExecuteOutcome::Executed(report) => {
                    print_json(&report, args.pretty)?;
                    if report.failed() > 0 {
                        tracing::warn!(
                            failed = report.failed(),
                            log = %queue.log_path().display(),
                            "some commands failed"
                        );
                    }
                }
            }
            Ok(())
        }
    }
}
