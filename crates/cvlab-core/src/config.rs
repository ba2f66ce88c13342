use std::path::{Path, PathBuf};

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::actions::ActionQueue;
use crate::brain::BrainThresholds;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::registry::RegistryStore;
use crate::util::env_string;

pub const DEFAULT_CONFIG_REL: &str = "configs/cvlab.toml";

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LabConfig {
    /// Project root holding registry/, docs/, outputs/ and the git checkout
    #[serde(default)]
    pub root: Option<String>,
    /// Automation state directory (relative paths resolve against `root`)
    #[serde(default)]
    pub state_dir: Option<String>,
    /// Where experiment run directories are created (relative to `root`)
    #[serde(default)]
    pub outputs_dir: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct BrainConfig {
    /// Session length in minutes after which a break is suggested
    #[serde(default)]
    pub max_session_minutes: Option<u64>,
    /// Minutes of uncommitted work before a checkpoint commit is proposed
    #[serde(default)]
    pub max_dirty_minutes: Option<u64>,
    /// Days on the same step before a direction review is suggested
    #[serde(default)]
    pub max_stale_days: Option<u64>,
    /// Images required before the dataset counts as ready for training
    #[serde(default)]
    pub min_dataset_images: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub lab: LabConfig,
    #[serde(default)]
    pub brain: BrainConfig,
}

impl Config {
    pub fn brain_thresholds(&self) -> BrainThresholds {
        let defaults = BrainThresholds::default();
        BrainThresholds {
            max_session_minutes: self
                .brain
                .max_session_minutes
                .unwrap_or(defaults.max_session_minutes),
            max_dirty_minutes: self
                .brain
                .max_dirty_minutes
                .unwrap_or(defaults.max_dirty_minutes),
            max_stale_days: self.brain.max_stale_days.unwrap_or(defaults.max_stale_days),
            min_dataset_images: self
                .brain
                .min_dataset_images
                .unwrap_or(defaults.min_dataset_images),
        }
    }
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let raw: toml::Value =
        toml::from_str(&content).map_err(|e| LabError::Config(format!("{}: {e}", path.display())))?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(LabError::Config(format!(
            "{}: {}",
            path.display(),
            validation_errors.join(", ")
        )));
    }
    toml::from_str(&content).map_err(|e| LabError::Config(format!("{}: {e}", path.display())))
}

/// Every file the lab reads or writes, derived from one root.
#[derive(Clone, Debug, Serialize)]
pub struct LabPaths {
    pub root: PathBuf,
    pub registry: PathBuf,
    pub outputs_dir: PathBuf,
    pub team_log: PathBuf,
    pub journal_json: PathBuf,
    pub journal_md: PathBuf,
    pub state_dir: PathBuf,
    pub pending_action: PathBuf,
    pub execution_log: PathBuf,
    pub system_state: PathBuf,
    pub failures_log: PathBuf,
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub docs_dir: PathBuf,
}

impl LabPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let docs_dir = root.join("docs");
        let state_dir = root.join("cvlab_core");
        Self {
            registry: root.join("registry").join("model_registry.json"),
            outputs_dir: root.join("outputs"),
            team_log: root.join("team").join("team_log.md"),
            journal_json: docs_dir.join("journal_events.json"),
            journal_md: docs_dir.join("dev_journal.md"),
            pending_action: state_dir.join("pending_action.json"),
            execution_log: state_dir.join("execution_log.txt"),
            system_state: state_dir.join("system_state.json"),
            failures_log: state_dir.join("memory").join("failures_log.md"),
            data_dir: root.join("data"),
            models_dir: root.join("models"),
            docs_dir,
            state_dir,
            root,
        }
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.pending_action = dir.join("pending_action.json");
        self.execution_log = dir.join("execution_log.txt");
        self.system_state = dir.join("system_state.json");
        self.failures_log = dir.join("memory").join("failures_log.md");
        self.state_dir = dir;
        self
    }

    pub fn with_outputs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outputs_dir = dir.into();
        self
    }

    /// Resolve a path stored in a document (relative entries are relative to the root).
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let p = Path::new(stored);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn journal(&self) -> Journal {
        Journal::new(&self.journal_json, &self.journal_md)
    }

    pub fn registry(&self) -> RegistryStore {
        RegistryStore::new(&self.registry).with_journal(self.journal())
    }

    pub fn actions(&self) -> ActionQueue {
        ActionQueue::new(&self.pending_action, &self.execution_log).with_journal(self.journal())
    }
}

/// Effective configuration plus the paths derived from it.
#[derive(Clone, Debug)]
pub struct LabContext {
    pub config: Config,
    pub paths: LabPaths,
}

impl LabContext {
    /// Load config (if any) and overlay `CVLAB_ROOT` / `CVLAB_STATE_DIR`.
    ///
    /// A config file that is named but missing, or that fails to parse or
    /// validate, is an error: a wrong root must never be guessed for writes.
    pub fn load() -> Result<Self> {
        let config = match env_string("CVLAB_CONFIG") {
            Some(explicit) => {
                let path = PathBuf::from(explicit);
                if !path.exists() {
                    return Err(LabError::Config(format!(
                        "CVLAB_CONFIG names {}, which does not exist",
                        path.display()
                    )));
                }
                load_config(&path)?
            }
            None => match resolve_config_path(DEFAULT_CONFIG_REL) {
                Some(path) => load_config(&path)?,
                None => Config::default(),
            },
        };
        Ok(Self::from_config(config))
    }

    /// Like [`LabContext::load`], but an unusable config is logged and replaced
    /// by defaults. Only for read-only commands.
    pub fn load_lenient() -> Self {
        Self::load().unwrap_or_else(|err| {
            tracing::error!("ignoring unusable config: {err}");
            Self::from_config(Config::default())
        })
    }

    fn from_config(config: Config) -> Self {
        let paths = effective_paths(&config);
        Self { config, paths }
    }
}

/// Compute effective lab paths (env first, then config, then the working directory).
pub fn load_effective_paths() -> LabPaths {
    LabContext::load_lenient().paths
}

fn effective_paths(config: &Config) -> LabPaths {
    let root = env_string("CVLAB_ROOT")
        .or_else(|| config.lab.root.clone())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut paths = LabPaths::under(&root);
    let state_dir = env_string("CVLAB_STATE_DIR").or_else(|| config.lab.state_dir.clone());
    if let Some(dir) = state_dir {
        paths = paths.with_state_dir(root.join(dir));
    }
    if let Some(dir) = &config.lab.outputs_dir {
        paths = paths.with_outputs_dir(root.join(dir));
    }
    paths
}

/// Resolve a config file path independent of the current working directory.
///
/// Search order (first existing wins):
/// - `CVLAB_CONFIG_DIR` environment variable if set (joined with `rel`)
/// - Directory of the current executable and its parent (joined with `rel`)
/// - The per-user config directory (`directories::ProjectDirs`)
/// - Current working directory (joined with `rel`)
///
/// If `rel` is absolute, it is returned if it exists.
pub fn resolve_config_path(rel: &str) -> Option<PathBuf> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return rel_path.exists().then(|| rel_path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(cfg_dir) = env_string("CVLAB_CONFIG_DIR") {
        candidates.push(PathBuf::from(cfg_dir));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.to_path_buf());
            if let Some(parent) = exe_dir.parent() {
                candidates.push(parent.to_path_buf());
            }
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("org", "cvlab", "cvlab") {
        candidates.push(dirs.config_dir().to_path_buf());
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    candidates
        .into_iter()
        .map(|base| base.join(rel))
        .find(|p| p.exists())
}
