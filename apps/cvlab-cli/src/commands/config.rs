use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use cvlab_core::{config_schema_json, load_config, LabContext};
use std::path::PathBuf;

use super::util::print_json;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the config JSON schema
    Schema(ConfigSchemaArgs),
    /// Validate a config file against the schema
    Validate(ConfigValidateArgs),
    /// Print the effective configuration
    Show(ConfigSchemaArgs),
}

#[derive(Args)]
pub struct ConfigSchemaArgs {
    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
pub struct ConfigValidateArgs {
    /// Path to the TOML config file
    path: PathBuf,
}

pub fn execute(ctx: &LabContext, cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema(args) => print_json(&config_schema_json(), args.pretty),
        ConfigCmd::Validate(args) => {
            load_config(&args.path)
                .with_context(|| format!("validating {}", args.path.display()))?;
            println!("{} is valid", args.path.display());
            Ok(())
        }
        ConfigCmd::Show(args) => print_json(&ctx.config, args.pretty),
    }
}
