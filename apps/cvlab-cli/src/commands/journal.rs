use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::LabContext;

use super::util::print_json;

#[derive(Subcommand)]
pub enum JournalCmd {
    /// Print the most recent journal events, oldest first
    Tail(JournalTailArgs),
}

#[derive(Args)]
pub struct JournalTailArgs {
    /// Number of events
    #[arg(short = 'n', long, default_value_t = 10)]
    limit: usize,
    /// Emit JSON instead of one line per event
    #[arg(long)]
    json: bool,
    /// Pretty-print JSON output (requires --json)
    #[arg(long, requires = "json")]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, cmd: JournalCmd) -> Result<()> {
    match cmd {
        JournalCmd::Tail(args) => {
            let journal = ctx.paths.journal();
            let events = journal
                .tail(args.limit)
                .with_context(|| format!("reading {}", journal.json_path().display()))?;
            if args.json {
                return print_json(&events, args.pretty);
            }
            for event in &events {
                println!("[{}] {:<20} {}", event.timestamp, event.event_type, event.title);
            }
            Ok(())
        }
    }
}
