pub mod action;
pub mod brain;
pub mod checkpoint;
pub mod config;
pub mod experiment;
pub mod health;
pub mod journal;
pub mod paths;
pub mod production;
pub mod registry;
pub mod serve;
pub mod shelf_life;
mod util;

pub use action::ActionCmd;
pub use brain::BrainCmd;
pub use checkpoint::CheckpointArgs;
pub use config::ConfigCmd;
pub use experiment::ExperimentCmd;
pub use health::HealthArgs;
pub use journal::JournalCmd;
pub use paths::PathsArgs;
pub use production::ProductionArgs;
pub use registry::RegistryCmd;
pub use serve::ServeCmd;
pub use shelf_life::ShelfLifeArgs;
