//! Serving side of the production gate.
//!
//! The service only ever loads the artifact named by the registry's production
//! pointer. No pointer, a dangling pointer, a pointer at a dev-mode run, or a
//! missing/corrupt artifact all refuse to serve; there is no fallback.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::LabPaths;
use crate::error::{LabError, Result};
use crate::registry::{ExperimentRecord, Registry, TrainingMode};
use crate::shelf_life::{self, ShelfLife, CLASS_LABELS};

/// Loads model artifacts. Must tell "absent" apart from "present but unusable".
pub trait ArtifactStore {
    type Handle;

    fn load(&self, path: &Path) -> Result<Self::Handle>;
}

/// Image classifier collaborator: one score per entry of [`CLASS_LABELS`].
pub trait Classifier<H> {
    fn scores(&self, model: &H, image: &Path) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Reads artifacts from the local filesystem; empty files count as corrupt.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileArtifactStore;

impl ArtifactStore for FileArtifactStore {
    type Handle = ModelArtifact;

    fn load(&self, path: &Path) -> Result<ModelArtifact> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LabError::ArtifactMissing(path.to_path_buf()))
            }
            Err(err) => {
                return Err(LabError::ArtifactCorrupt {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        };
        if bytes.is_empty() {
            return Err(LabError::ArtifactCorrupt {
                path: path.to_path_buf(),
                reason: "file is empty".into(),
            });
        }
        Ok(ModelArtifact {
            path: path.to_path_buf(),
            bytes,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub exp_id: String,
    pub label: &'static str,
    pub confidence: f64,
    pub shelf_life: ShelfLife,
}

pub struct InferenceService<H> {
    record: ExperimentRecord,
    artifact_path: PathBuf,
    model: H,
}

/// Resolve the production record and its on-disk artifact path without loading it.
pub fn resolve_production(registry: &Registry, paths: &LabPaths) -> Result<(ExperimentRecord, PathBuf)> {
    let exp_id = registry
        .production_model
        .as_deref()
        .ok_or(LabError::NoProductionModel)?;
    let record = registry
        .find(exp_id)
        .ok_or_else(|| LabError::not_found("production experiment", exp_id))?;
    if record.mode != TrainingMode::Full {
        return Err(LabError::invalid_state(format!(
            "production experiment {exp_id} was trained in {} mode; only full runs are served",
            record.mode
        )));
    }
    let artifact = paths.resolve(&record.path);
    Ok((record.clone(), artifact))
}

impl<H> InferenceService<H> {
    pub fn open<S>(registry: &Registry, paths: &LabPaths, store: &S) -> Result<Self>
    where
        S: ArtifactStore<Handle = H>,
    {
        let (record, artifact_path) = resolve_production(registry, paths)?;
        let model = store.load(&artifact_path).map_err(|err| {
            tracing::error!(
                exp_id = %record.exp_id,
                artifact = %artifact_path.display(),
                "refusing to serve: {err}"
            );
            err
        })?;
        tracing::info!(exp_id = %record.exp_id, "production model loaded");
        Ok(Self {
            record,
            artifact_path,
            model,
        })
    }

    pub fn record(&self) -> &ExperimentRecord {
        &self.record
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn predict(&self, classifier: &impl Classifier<H>, image: &Path) -> Result<Prediction> {
        let scores = classifier.scores(&self.model, image)?;
        if scores.len() != CLASS_LABELS.len() {
            return Err(LabError::invalid_state(format!(
                "classifier returned {} scores, expected {}",
                scores.len(),
                CLASS_LABELS.len()
            )));
        }
        let (idx, confidence) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |best, (i, s)| {
                if s > best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        let label = CLASS_LABELS[idx];
        Ok(Prediction {
            exp_id: self.record.exp_id.clone(),
            label,
            confidence,
            shelf_life: shelf_life::estimate(label, confidence),
        })
    }
}
