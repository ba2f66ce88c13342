//! Experiment registry: append-only run log plus the best/production pointers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{LabError, Result};
use crate::journal::{Journal, JournalEvent};
use crate::store::JsonDocument;
use crate::topics;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    Dev,
    Full,
}

impl TrainingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingMode::Dev => "dev",
            TrainingMode::Full => "full",
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingMode {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(TrainingMode::Dev),
            "full" => Ok(TrainingMode::Full),
            other => Err(LabError::InvalidRecord(format!(
                "unknown training mode '{other}' (expected dev|full)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExperimentRecord {
    pub exp_id: String,
    pub path: String,
    #[serde(alias = "accuracy")]
    pub val_accuracy: f64,
    pub mode: TrainingMode,
    pub member: String,
}

impl ExperimentRecord {
    fn validate(&self) -> Result<()> {
        if self.exp_id.trim().is_empty() {
            return Err(LabError::InvalidRecord("exp_id must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.val_accuracy) {
            return Err(LabError::InvalidRecord(format!(
                "val_accuracy {} for {} is outside [0, 1]",
                self.val_accuracy, self.exp_id
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    #[serde(default)]
    pub best_model: Option<String>,
    #[serde(default)]
    pub production_model: Option<String>,
    #[serde(default)]
    pub production_locked: bool,
    #[serde(default)]
    pub models: Vec<ExperimentRecord>,
}

impl Registry {
    pub fn find(&self, exp_id: &str) -> Option<&ExperimentRecord> {
        self.models.iter().find(|m| m.exp_id == exp_id)
    }

    /// Linear scan with `>=`, so the latest of several equal maxima wins.
    pub fn best_by_accuracy(&self) -> Option<&ExperimentRecord> {
        let mut best: Option<&ExperimentRecord> = None;
        for record in &self.models {
            match best {
                Some(current) if record.val_accuracy < current.val_accuracy => {}
                _ => best = Some(record),
            }
        }
        best
    }

    pub fn production_record(&self) -> Option<&ExperimentRecord> {
        self.production_model.as_deref().and_then(|id| self.find(id))
    }

    /// Pointer problems: references to ids that are not in `models`, or a non-full production record.
    pub fn integrity_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Some(best) = &self.best_model {
            if self.find(best).is_none() {
                issues.push(format!("best_model '{best}' is not a registered experiment"));
            }
        }
        if let Some(prod) = &self.production_model {
            match self.find(prod) {
                None => issues.push(format!(
                    "production_model '{prod}' is not a registered experiment"
                )),
                Some(record) if record.mode != TrainingMode::Full => issues.push(format!(
                    "production_model '{prod}' was trained in {} mode",
                    record.mode
                )),
                Some(_) => {}
            }
        }
        issues
    }
}

pub struct RegistryStore {
    doc: JsonDocument<Registry>,
    journal: Option<Journal>,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn path(&self) -> &std::path::Path {
        self.doc.path()
    }

    /// Current document; the default document when the file does not exist yet.
    pub fn load(&self) -> Result<Registry> {
        Ok(self.doc.read()?.unwrap_or_default())
    }

    /// Advisory read: corruption is logged and an empty registry returned.
    pub fn load_or_default(&self) -> Registry {
        match self.load() {
            Ok(registry) => registry,
            Err(err) => {
                tracing::warn!("registry unreadable, using empty default: {err}");
                Registry::default()
            }
        }
    }

    pub fn save(&self, registry: &Registry) -> Result<()> {
        self.doc.write(registry)
    }

    pub fn append(&self, record: ExperimentRecord) -> Result<Registry> {
        record.validate()?;
        let updated = self.doc.locked(|doc| {
            let mut registry = doc.read()?.unwrap_or_default();
            if registry.find(&record.exp_id).is_some() {
                return Err(LabError::InvalidRecord(format!(
                    "experiment {} is already registered",
                    record.exp_id
                )));
            }
            registry.models.push(record.clone());
            registry.best_model = registry.best_by_accuracy().map(|m| m.exp_id.clone());
            doc.write(&registry)?;
            Ok(registry)
        })?;
        tracing::info!(
            exp_id = %record.exp_id,
            val_accuracy = record.val_accuracy,
            best = ?updated.best_model,
            "registry updated"
        );
        self.emit(
            JournalEvent::new(
                topics::EVENT_REGISTRY_UPDATED,
                format!("Registered {}", record.exp_id),
                format!(
                    "{} registered a {} run with validation accuracy {:.4}.",
                    record.member, record.mode, record.val_accuracy
                ),
            )
            .with_meta("exp_id", record.exp_id.clone())
            .with_meta("val_accuracy", json!(record.val_accuracy))
            .with_meta("best_model", json!(updated.best_model)),
        );
        Ok(updated)
    }

    pub fn promote(&self, exp_id: &str) -> Result<Registry> {
        let updated = self.doc.locked(|doc| {
            let mut registry = doc.read()?.unwrap_or_default();
            if registry.production_locked {
                return Err(LabError::invalid_state(
                    "production model is locked; unlock before promoting",
                ));
            }
            let record = registry
                .find(exp_id)
                .ok_or_else(|| LabError::not_found("experiment", exp_id))?;
            if record.mode != TrainingMode::Full {
                return Err(LabError::invalid_state(format!(
                    "experiment {exp_id} was trained in {} mode; only full runs can serve production",
                    record.mode
                )));
            }
            registry.production_model = Some(exp_id.to_string());
            doc.write(&registry)?;
            Ok(registry)
        })?;
        tracing::info!(%exp_id, "production model set");
        self.emit(
            JournalEvent::new(
                topics::EVENT_PRODUCTION_SET,
                format!("Production model set to {exp_id}"),
                "Inference now serves this experiment's artifact.",
            )
            .with_meta("exp_id", exp_id),
        );
        Ok(updated)
    }

    pub fn lock(&self) -> Result<Registry> {
        let updated = self.set_locked(true)?;
        self.emit(
            JournalEvent::new(
                topics::EVENT_PRODUCTION_LOCKED,
                "Production model locked",
                "Promotions are refused until the lock is released.",
            )
            .with_meta("production_model", json!(updated.production_model)),
        );
        Ok(updated)
    }

    pub fn unlock(&self) -> Result<Registry> {
        let updated = self.set_locked(false)?;
        self.emit(
            JournalEvent::new(
                topics::EVENT_PRODUCTION_UNLOCKED,
                "Production model unlocked",
                "Promotions are accepted again.",
            )
            .with_meta("production_model", json!(updated.production_model)),
        );
        Ok(updated)
    }

    fn set_locked(&self, locked: bool) -> Result<Registry> {
        let updated = self.doc.locked(|doc| {
            let mut registry = doc.read()?.unwrap_or_default();
            registry.production_locked = locked;
            doc.write(&registry)?;
            Ok(registry)
        })?;
        tracing::info!(locked, "production lock toggled");
        Ok(updated)
    }

    fn emit(&self, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            journal.record(event);
        }
    }
}
