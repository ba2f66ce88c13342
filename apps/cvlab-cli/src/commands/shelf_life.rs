use anyhow::{ensure, Result};
use clap::Args;
use cvlab_core::shelf_life;

use super::util::print_json;

#[derive(Args)]
pub struct ShelfLifeArgs {
    /// Ripeness label (unripe, ripe, overripe, rotten)
    pub label: String,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

pub fn execute(args: ShelfLifeArgs) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&args.confidence),
        "confidence {} is outside [0, 1]",
        args.confidence
    );
    print_json(
        &shelf_life::estimate(&args.label, args.confidence),
        args.pretty,
    )
}
