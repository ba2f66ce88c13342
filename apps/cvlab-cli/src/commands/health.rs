use anyhow::Result;
use clap::Args;
use cvlab_core::health::{self, HealthStatus};
use cvlab_core::{LabContext, ShellRunner};

use super::util::print_json;

#[derive(Args)]
pub struct HealthArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
    /// Exit non-zero when any check fails
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(ctx: &LabContext, args: HealthArgs) -> Result<()> {
    let runner = ShellRunner::new(&ctx.paths.root);
    let report = health::check(&ctx.paths, &runner);
    print_json(&report, args.pretty)?;
    if args.strict && report.status != HealthStatus::Healthy {
        anyhow::bail!("{} health check(s) failed", report.checks_failed);
    }
    Ok(())
}
