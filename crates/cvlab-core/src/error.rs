use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("document {path} is not valid JSON: {source}")]
    DataCorruption {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("command `{command}` failed (exit {code:?}): {stderr}")]
    ExternalCommandFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("invalid experiment record: {0}")]
    InvalidRecord(String),
    #[error("metrics are missing required field '{0}'")]
    MissingMetric(&'static str),
    #[error("experiment directory already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("no production model set; refusing to serve")]
    NoProductionModel,
    #[error("production artifact not found at {}", .0.display())]
    ArtifactMissing(PathBuf),
    #[error("production artifact at {} is unreadable: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl LabError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        LabError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        LabError::InvalidState(reason.into())
    }

    /// True for the errors a caller should surface as "refused" rather than "broken".
    ///
    /// Every fail-closed serving outcome counts, including unusable artifacts.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            LabError::InvalidState(_)
                | LabError::NotFound { .. }
                | LabError::NoProductionModel
                | LabError::ArtifactMissing(_)
                | LabError::ArtifactCorrupt { .. }
        )
    }
}

pub type Result<T, E = LabError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serving_refusals_share_one_classification() {
        assert!(LabError::NoProductionModel.is_refusal());
        assert!(LabError::ArtifactMissing(PathBuf::from("outputs/x/model.keras")).is_refusal());
        assert!(LabError::ArtifactCorrupt {
            path: PathBuf::from("outputs/x/model.keras"),
            reason: "file is empty".into(),
        }
        .is_refusal());
        assert!(LabError::invalid_state("locked").is_refusal());
        assert!(!LabError::Config("bad".into()).is_refusal());
        assert!(!LabError::MissingMetric("val_accuracy").is_refusal());
    }
}
