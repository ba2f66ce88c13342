//! Bookkeeping for one training run: created -> metrics recorded -> artifact saved -> finalized.
//!
//! Nothing is rolled back. A run that fails midway leaves its directory under
//! the outputs root as an orphan.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::LabPaths;
use crate::error::{LabError, Result};
use crate::journal::JournalEvent;
use crate::registry::{ExperimentRecord, TrainingMode};
use crate::topics;
use crate::util::{append_text, minute_stamp};

pub const METRICS_FILE: &str = "metrics.json";
pub const SUMMARY_FILE: &str = "summary.md";
const ACCURACY_KEYS: [&str; 2] = ["val_accuracy", "accuracy"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Created,
    MetricsRecorded,
    ArtifactSaved,
    Finalized,
}

#[derive(Debug)]
pub struct Experiment {
    exp_id: String,
    member: String,
    mode: TrainingMode,
    dir: PathBuf,
    stage: LifecycleStage,
    metrics: Map<String, Value>,
    val_accuracy: Option<f64>,
    artifact: Option<PathBuf>,
}

/// `EXP-<YYYY-MM-DD-HHMM>-<member>-<mode>`; the member tag is reduced to path-safe characters.
pub fn experiment_id(at: DateTime<Local>, member: &str, mode: TrainingMode) -> String {
    let tag: String = member
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("EXP-{}-{}-{}", at.format("%Y-%m-%d-%H%M"), tag, mode)
}

impl Experiment {
    pub fn begin(paths: &LabPaths, member: &str, mode: TrainingMode) -> Result<Self> {
        Self::begin_at(paths, member, mode, Local::now())
    }

    /// Create the run directory exclusively; an existing directory is a collision.
    pub fn begin_at(
        paths: &LabPaths,
        member: &str,
        mode: TrainingMode,
        at: DateTime<Local>,
    ) -> Result<Self> {
        if member.trim().is_empty() {
            return Err(LabError::InvalidRecord("member tag must not be empty".into()));
        }
        let exp_id = experiment_id(at, member, mode);
        fs::create_dir_all(&paths.outputs_dir)?;
        let dir = paths.outputs_dir.join(&exp_id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(LabError::AlreadyExists(dir));
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(%exp_id, dir = %dir.display(), "experiment started");
        Ok(Self {
            exp_id,
            member: member.trim().to_string(),
            mode,
            dir,
            stage: LifecycleStage::Created,
            metrics: Map::new(),
            val_accuracy: None,
            artifact: None,
        })
    }

    pub fn exp_id(&self) -> &str {
        &self.exp_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stage(&self) -> LifecycleStage {
        self.stage
    }

    /// Store metrics; they must carry a numeric validation accuracy.
    pub fn record_metrics(&mut self, metrics: Map<String, Value>) -> Result<f64> {
        self.require_stage(
            &[LifecycleStage::Created, LifecycleStage::MetricsRecorded],
            "record metrics",
        )?;
        let accuracy = ACCURACY_KEYS
            .iter()
            .find_map(|key| metrics.get(*key).and_then(Value::as_f64))
            .ok_or(LabError::MissingMetric("val_accuracy"))?;
        if !(0.0..=1.0).contains(&accuracy) {
            return Err(LabError::InvalidRecord(format!(
                "validation accuracy {accuracy} is outside [0, 1]"
            )));
        }
        let body = serde_json::to_vec_pretty(&Value::Object(metrics.clone()))?;
        fs::write(self.dir.join(METRICS_FILE), body)?;
        self.metrics = metrics;
        self.val_accuracy = Some(accuracy);
        self.stage = LifecycleStage::MetricsRecorded;
        Ok(accuracy)
    }

    /// Copy the trained artifact into the run directory as `model.<ext>`.
    pub fn save_artifact(&mut self, source: &Path) -> Result<PathBuf> {
        self.require_stage(&[LifecycleStage::MetricsRecorded], "save the artifact")?;
        if !source.exists() {
            return Err(LabError::ArtifactMissing(source.to_path_buf()));
        }
        let file_name = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("model.{ext}"),
            None => "model".to_string(),
        };
        let dest = self.dir.join(file_name);
        fs::copy(source, &dest)?;
        self.artifact = Some(dest.clone());
        self.stage = LifecycleStage::ArtifactSaved;
        Ok(dest)
    }

    /// Write the summary, register the run, and append to the team log.
    pub fn finalize(&mut self, paths: &LabPaths) -> Result<ExperimentRecord> {
        self.require_stage(&[LifecycleStage::ArtifactSaved], "finalize")?;
        let (Some(val_accuracy), Some(artifact)) = (self.val_accuracy, self.artifact.clone()) else {
            return Err(LabError::invalid_state(format!(
                "experiment {} has no metrics or artifact",
                self.exp_id
            )));
        };

        fs::write(self.dir.join(SUMMARY_FILE), self.render_summary(val_accuracy))?;

        let stored_path = artifact
            .strip_prefix(&paths.root)
            .unwrap_or(&artifact)
            .to_string_lossy()
            .replace('\\', "/");
        let record = ExperimentRecord {
            exp_id: self.exp_id.clone(),
            path: stored_path,
            val_accuracy,
            mode: self.mode,
            member: self.member.clone(),
        };
        paths.registry().append(record.clone())?;

        append_text(
            &paths.team_log,
            None,
            &format!(
                "[{}] {} ran experiment {}",
                minute_stamp(Local::now()),
                self.member,
                self.exp_id
            ),
        )?;

        paths.journal().record(
            JournalEvent::new(
                topics::EVENT_TRAINING_COMPLETED,
                format!("Training completed: {}", self.exp_id),
                format!(
                    "{} finished a {} run with validation accuracy {:.4}.",
                    self.member, self.mode, val_accuracy
                ),
            )
            .with_meta("exp_id", self.exp_id.clone())
            .with_meta("mode", self.mode.as_str())
            .with_meta("metrics", Value::Object(self.metrics.clone()))
            .with_meta("artifact", json!(record.path)),
        );

        self.stage = LifecycleStage::Finalized;
        tracing::info!(exp_id = %self.exp_id, val_accuracy, "experiment finalized");
        Ok(record)
    }

    fn render_summary(&self, val_accuracy: f64) -> String {
        format!(
            "# {}\n\n**Member:** {}  \n**Mode:** {}  \n**Validation accuracy:** {:.4}\n\n## Notes\nAuto-generated experiment summary.\n",
            self.exp_id, self.member, self.mode, val_accuracy
        )
    }

    fn require_stage(&self, allowed: &[LifecycleStage], step: &str) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(LabError::invalid_state(format!(
                "cannot {step} for {} while {:?}",
                self.exp_id, self.stage
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 14, 5, 0).unwrap()
    }

    fn metrics(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn artifact(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("trained.keras");
        fs::write(&path, b"weights").unwrap();
        path
    }

    #[test]
    fn id_combines_minute_member_and_mode() {
        assert_eq!(
            experiment_id(at(), "ana", TrainingMode::Full),
            "EXP-2025-06-01-1405-ana-full"
        );
        assert_eq!(
            experiment_id(at(), "Ana B/2", TrainingMode::Dev),
            "EXP-2025-06-01-1405-Ana_B_2-dev"
        );
    }

    #[test]
    fn begin_collides_on_existing_directory() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let first = Experiment::begin_at(&paths, "ana", TrainingMode::Full, at()).unwrap();
        assert!(first.dir().is_dir());
        let err = Experiment::begin_at(&paths, "ana", TrainingMode::Full, at()).unwrap_err();
        assert!(matches!(err, LabError::AlreadyExists(p) if p == first.dir()));
    }

    #[test]
    fn record_metrics_requires_accuracy() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let mut exp = Experiment::begin_at(&paths, "ana", TrainingMode::Dev, at()).unwrap();
        let err = exp.record_metrics(metrics(json!({"loss": 0.3}))).unwrap_err();
        assert!(matches!(err, LabError::MissingMetric("val_accuracy")));
        assert_eq!(exp.stage(), LifecycleStage::Created);
        assert!(!exp.dir().join(METRICS_FILE).exists());

        let acc = exp
            .record_metrics(metrics(json!({"accuracy": 0.81, "loss": 0.3})))
            .unwrap();
        assert_eq!(acc, 0.81);
        assert_eq!(exp.stage(), LifecycleStage::MetricsRecorded);
    }

    #[test]
    fn out_of_order_steps_are_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let source = artifact(&dir);
        let mut exp = Experiment::begin_at(&paths, "ana", TrainingMode::Full, at()).unwrap();
        assert!(matches!(exp.finalize(&paths), Err(LabError::InvalidState(_))));
        assert!(matches!(
            exp.save_artifact(&source),
            Err(LabError::InvalidState(_))
        ));
        assert!(paths.registry().load().unwrap().models.is_empty());
        // The orphaned directory stays behind.
        assert!(exp.dir().is_dir());
    }

    #[test]
    fn full_lifecycle_registers_and_logs() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let source = artifact(&dir);
        let mut exp = Experiment::begin_at(&paths, "ana", TrainingMode::Full, at()).unwrap();
        exp.record_metrics(metrics(json!({"val_accuracy": 0.92, "epochs": 10})))
            .unwrap();
        let saved = exp.save_artifact(&source).unwrap();
        assert_eq!(saved, exp.dir().join("model.keras"));

        let record = exp.finalize(&paths).unwrap();
        assert_eq!(exp.stage(), LifecycleStage::Finalized);
        assert_eq!(record.path, "outputs/EXP-2025-06-01-1405-ana-full/model.keras");
        assert_eq!(paths.resolve(&record.path), saved);

        let registry = paths.registry().load().unwrap();
        assert_eq!(registry.models, vec![record.clone()]);
        assert_eq!(registry.best_model.as_deref(), Some(record.exp_id.as_str()));

        let summary = fs::read_to_string(exp.dir().join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("# EXP-2025-06-01-1405-ana-full"));
        assert!(summary.contains("**Validation accuracy:** 0.9200"));

        let team_log = fs::read_to_string(&paths.team_log).unwrap();
        assert!(team_log.ends_with("ana ran experiment EXP-2025-06-01-1405-ana-full\n"));

        let kinds: Vec<String> = paths
            .journal()
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(kinds, vec!["REGISTRY_UPDATED", "TRAINING_COMPLETED"]);

        assert!(matches!(exp.finalize(&paths), Err(LabError::InvalidState(_))));
    }

    #[test]
    fn missing_source_artifact_is_reported() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let mut exp = Experiment::begin_at(&paths, "ana", TrainingMode::Dev, at()).unwrap();
        exp.record_metrics(metrics(json!({"val_accuracy": 0.5})))
            .unwrap();
        assert!(matches!(
            exp.save_artifact(&dir.path().join("nope.keras")),
            Err(LabError::ArtifactMissing(_))
        ));
        assert_eq!(exp.stage(), LifecycleStage::MetricsRecorded);
    }
}
