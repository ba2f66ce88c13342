use anyhow::Result;
use clap::Args;
use cvlab_core::LabContext;

use super::util::print_json;

#[derive(Args)]
pub struct PathsArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

pub fn execute(ctx: &LabContext, args: PathsArgs) -> Result<()> {
    print_json(&ctx.paths, args.pretty)
}
