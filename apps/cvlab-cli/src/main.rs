use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvlab_core::{LabContext, LabError};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{
    ActionCmd, BrainCmd, CheckpointArgs, ConfigCmd, ExperimentCmd, HealthArgs, JournalCmd,
    PathsArgs, ProductionArgs, RegistryCmd, ServeCmd, ShelfLifeArgs,
};

#[derive(Parser)]
#[command(name = "cvlab", version, about = "CVLab experiment registry and lab automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set, lock or unlock the production model pointer
    Production(ProductionArgs),
    /// Inspect the experiment registry
    Registry {
        #[command(subcommand)]
        cmd: RegistryCmd,
    },
    /// Experiment lifecycle helpers
    Experiment {
        #[command(subcommand)]
        cmd: ExperimentCmd,
    },
    /// Single-slot pending action queue (propose, approve, execute)
    Action {
        #[command(subcommand)]
        cmd: ActionCmd,
    },
    /// Estimate remaining shelf life for a ripeness label
    ShelfLife(ShelfLifeArgs),
    /// Production serving checks
    Serve {
        #[command(subcommand)]
        cmd: ServeCmd,
    },
    /// Audit git state, registry and journal
    Health(HealthArgs),
    /// Automation brain (decisions, sessions)
    Brain {
        #[command(subcommand)]
        cmd: BrainCmd,
    },
    /// Development journal helpers
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },
    /// Commit and push a safe checkpoint
    Checkpoint(CheckpointArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Print effective lab paths (JSON)
    Paths(PathsArgs),
}

impl Commands {
    /// Commands that write lab state or act on it refuse to run on a guessed root.
    fn needs_strict_config(&self) -> bool {
        match self {
            Commands::Production(args) => args.cmd.is_none(),
            Commands::Experiment { .. } | Commands::Serve { .. } | Commands::Checkpoint(_) => true,
            Commands::Action { cmd } => !matches!(cmd, ActionCmd::Show(_)),
            Commands::Brain { cmd } => !matches!(cmd, BrainCmd::State(_)),
            Commands::Registry { .. }
            | Commands::ShelfLife(_)
            | Commands::Health(_)
            | Commands::Journal { .. }
            | Commands::Config { .. }
            | Commands::Paths(_) => false,
        }
    }
}

fn run(cmd: Commands) -> Result<()> {
    let ctx = if cmd.needs_strict_config() {
        LabContext::load().context("loading lab configuration")?
    } else {
        LabContext::load_lenient()
    };
    match cmd {
        Commands::Production(args) => commands::production::execute(&ctx, args),
        Commands::Registry { cmd } => commands::registry::execute(&ctx, cmd),
        Commands::Experiment { cmd } => commands::experiment::execute(&ctx, cmd),
        Commands::Action { cmd } => commands::action::execute(&ctx, cmd),
        Commands::ShelfLife(args) => commands::shelf_life::execute(args),
        Commands::Serve { cmd } => commands::serve::execute(&ctx, cmd),
        Commands::Health(args) => commands::health::execute(&ctx, args),
        Commands::Brain { cmd } => commands::brain::execute(&ctx, cmd),
        Commands::Journal { cmd } => commands::journal::execute(&ctx, cmd),
        Commands::Checkpoint(args) => commands::checkpoint::execute(&ctx, args),
        Commands::Paths(args) => commands::paths::execute(&ctx, args),
        Commands::Config { cmd } => commands::config::execute(&ctx, cmd),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LabError>() {
        Some(lab) if lab.is_refusal() => 2,
        _ => 1,
    }
}

fn main() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}
