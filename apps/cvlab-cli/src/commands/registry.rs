use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::LabContext;

use super::util::print_json;

#[derive(Subcommand)]
pub enum RegistryCmd {
    /// Print the registry document
    Show(RegistryShowArgs),
    /// Check registry pointers against the registered runs
    Verify,
}

#[derive(Args)]
pub struct RegistryShowArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Pretty-print JSON output (requires --json)
    #[arg(long, requires = "json")]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, cmd: RegistryCmd) -> Result<()> {
    let store = ctx.paths.registry();
    match cmd {
        RegistryCmd::Show(args) => {
            let registry = store.load_or_default();
            if args.json {
                return print_json(&registry, args.pretty);
            }
            println!(
                "best: {}  production: {}{}",
                registry.best_model.as_deref().unwrap_or("-"),
                registry.production_model.as_deref().unwrap_or("-"),
                if registry.production_locked { " (locked)" } else { "" }
            );
            for record in &registry.models {
                println!(
                    "{:<40} {:>6.4} {:<4} {:<12} {}",
                    record.exp_id,
                    record.val_accuracy,
                    record.mode.as_str(),
                    record.member,
                    record.path
                );
            }
            Ok(())
        }
        RegistryCmd::Verify => {
            let registry = store
                .load()
                .with_context(|| format!("reading {}", store.path().display()))?;
            let issues = registry.integrity_issues();
            if issues.is_empty() {
                println!("registry ok ({} runs)", registry.models.len());
                return Ok(());
            }
            for issue in &issues {
                println!("- {issue}");
            }
            anyhow::bail!("{} registry issue(s) found", issues.len())
        }
    }
}
