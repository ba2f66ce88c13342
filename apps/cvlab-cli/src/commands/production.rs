use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::LabContext;
use serde_json::json;

use super::util::print_json;

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct ProductionArgs {
    /// Point production at this experiment id (must be a full-mode run)
    #[arg(long, value_name = "EXP_ID")]
    pub set: Option<String>,
    /// Lock the production pointer
    #[arg(long)]
    pub lock: bool,
    /// Unlock the production pointer
    #[arg(long)]
    pub unlock: bool,
    #[command(subcommand)]
    pub cmd: Option<ProductionCmd>,
}

#[derive(Subcommand)]
pub enum ProductionCmd {
    /// Print the production pointer, lock flag and record
    Show(ShowArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

pub fn execute(ctx: &LabContext, args: ProductionArgs) -> Result<()> {
    let store = ctx.paths.registry();
    if let Some(ProductionCmd::Show(show)) = args.cmd {
        let registry = store.load_or_default();
        let payload = json!({
            "production_model": registry.production_model,
            "production_locked": registry.production_locked,
            "record": registry.production_record(),
        });
        return print_json(&payload, show.pretty);
    }
    if args.set.is_none() && !args.lock && !args.unlock {
        anyhow::bail!("nothing to do: pass --set <EXP_ID>, --lock, --unlock or `show`");
    }

    // unlock -> set -> lock, so `--unlock --set X --lock` re-points a locked gate.
    if args.unlock {
        store.unlock().context("unlocking production")?;
        println!("Production unlocked");
    }
    if let Some(exp_id) = args.set.as_deref() {
        store
            .promote(exp_id)
            .with_context(|| format!("setting production model to {exp_id}"))?;
        println!("Production model set to {exp_id}");
    }
    if args.lock {
        store.lock().context("locking production")?;
        println!("Production locked");
    }
    Ok(())
}
