use anyhow::Result;
use chrono::Local;
use clap::{Args, Subcommand};
use cvlab_core::brain::Brain;
use cvlab_core::{LabContext, ShellRunner};

use super::util::print_json;

#[derive(Subcommand)]
pub enum BrainCmd {
    /// Run one evaluation pass and record the decision
    Evaluate(BrainArgs),
    /// Print the persisted system state
    State(BrainArgs),
    /// Mark the start of a work session
    SessionStart(BrainArgs),
    /// Close the current work session
    SessionEnd(BrainArgs),
}

#[derive(Args)]
pub struct BrainArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, cmd: BrainCmd) -> Result<()> {
    let brain = Brain::new(&ctx.paths, ctx.config.brain_thresholds());
    match cmd {
        BrainCmd::Evaluate(args) => {
            let runner = ShellRunner::new(&ctx.paths.root);
            let evaluation = brain.evaluate(&runner, Local::now())?;
            print_json(&evaluation, args.pretty)
        }
        BrainCmd::State(args) => print_json(&brain.state(), args.pretty),
        BrainCmd::SessionStart(args) => print_json(&brain.start_session(Local::now())?, args.pretty),
        BrainCmd::SessionEnd(args) => print_json(&brain.close_session(Local::now())?, args.pretty),
    }
}
