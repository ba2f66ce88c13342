//! CVLab core: experiment registry, production gate and the lab automation
//! that surrounds them.

pub mod actions;
pub mod brain;
pub mod checkpoint;
mod config;
pub mod error;
pub mod exec;
pub mod experiment;
pub mod health;
pub mod inference;
pub mod journal;
pub mod registry;
pub mod shelf_life;
pub mod store;
pub mod topics;
pub mod util;

pub use config::{
    config_schema_json, load_config, load_effective_paths, resolve_config_path, BrainConfig,
    Config, LabConfig, LabContext, LabPaths, DEFAULT_CONFIG_REL,
};
pub use error::{LabError, Result};
pub use exec::{CommandOutput, CommandRunner, ShellRunner};
pub use registry::{ExperimentRecord, Registry, RegistryStore, TrainingMode};
