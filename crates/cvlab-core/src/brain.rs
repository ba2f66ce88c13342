//! Automation brain: the single owner of `system_state.json`.
//!
//! An external timer calls [`Brain::evaluate`]; each call observes the
//! workspace, records one decision and may propose a checkpoint action. The
//! priorities are fixed: structural failures first, then the data-collection
//! stage, then engineering health.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::config::LabPaths;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::store::JsonDocument;
use crate::util::{minute_stamp, MINUTE_FORMAT};

pub const STAGE_DATA_COLLECTION: &str = "data_collection";
pub const STAGE_TRAINING_READY: &str = "training_ready";
pub const CHECKPOINT_TITLE: &str = "Safe checkpoint commit";
pub const CHECKPOINT_MESSAGE: &str = "CVLab auto safe checkpoint";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrainThresholds {
    pub max_session_minutes: u64,
    pub max_dirty_minutes: u64,
    pub max_stale_days: u64,
    pub min_dataset_images: usize,
}

impl Default for BrainThresholds {
    fn default() -> Self {
        Self {
            max_session_minutes: 140,
            max_dirty_minutes: 60,
            max_stale_days: 4,
            min_dataset_images: 120,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    SuggestBreak,
    SuggestCommit,
    ReviewDirection,
    SystemAttention,
    CreateDataset,
    CollectDataset,
    ReadyForTraining,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::SuggestBreak => "suggest_break",
            Decision::SuggestCommit => "suggest_commit",
            Decision::ReviewDirection => "review_direction",
            Decision::SystemAttention => "system_attention",
            Decision::CreateDataset => "create_dataset",
            Decision::CollectDataset => "collect_dataset",
            Decision::ReadyForTraining => "ready_for_training",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitStatus {
    Clean,
    Changes,
    Unknown,
}

/// Persisted automation state. Unknown fields written by other tools are kept.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_health: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status: Option<GitStatus>,
    #[serde(default)]
    pub git_dirty_minutes: u64,
    #[serde(default)]
    pub session_runtime_min: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_started_at: Option<String>,
    #[serde(default)]
    pub step_stale_days: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_engineering_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress_update: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub message: String,
    pub failures: Vec<String>,
    pub proposed_action: bool,
}

pub struct Brain<'a> {
    paths: &'a LabPaths,
    thresholds: BrainThresholds,
    state: JsonDocument<SystemState>,
}

impl<'a> Brain<'a> {
    pub fn new(paths: &'a LabPaths, thresholds: BrainThresholds) -> Self {
        Self {
            paths,
            thresholds,
            state: JsonDocument::new(&paths.system_state),
        }
    }

    /// Advisory read: a corrupt state file is logged and read as empty.
    pub fn state(&self) -> SystemState {
        match self.state.read() {
            Ok(state) => state.unwrap_or_default(),
            Err(err) => {
                tracing::warn!("system state unreadable, using empty default: {err}");
                SystemState::default()
            }
        }
    }

    pub fn start_session(&self, now: DateTime<Local>) -> Result<SystemState> {
        self.update(|state| {
            state.session_started_at = Some(minute_stamp(now));
            state.session_runtime_min = 0;
        })
    }

    pub fn close_session(&self, now: DateTime<Local>) -> Result<SystemState> {
        self.update(|state| {
            if let Some(started) = state.session_started_at.take() {
                state.session_runtime_min = minutes_between(&started, now);
            }
        })
    }

    pub fn evaluate(&self, runner: &dyn CommandRunner, now: DateTime<Local>) -> Result<Evaluation> {
        let mut proposal = false;
        let evaluation = self.state.locked(|doc| {
            let mut state = doc.read()?.unwrap_or_default();
            let stamp = minute_stamp(now);

            let failures = self.detect_failures();
            if !failures.is_empty() {
                state.system_health = Some("attention".into());
                let eval = Evaluation {
                    decision: Decision::SystemAttention,
                    message: "System issue detected. Check failures log.".into(),
                    failures,
                    proposed_action: false,
                };
                record(&mut state, &eval, &stamp);
                self.log_failures(&eval.failures, &stamp)?;
                doc.write(&state)?;
                return Ok(eval);
            }
            state.system_health = Some("stable".into());

            self.observe_git(&mut state, runner, now);
            if let Some(started) = &state.session_started_at {
                state.session_runtime_min = minutes_between(started, now);
            }
            if let Some(progress) = &state.last_progress_update {
                state.step_stale_days = minutes_between(progress, now) / (60 * 24);
            }

            let eval = match self.project_intelligence(&mut state, &stamp) {
                Some(eval) => eval,
                None => {
                    let eval = self.engineering_health(&state);
                    proposal = eval.decision == Decision::SuggestCommit;
                    eval
                }
            };
            record(&mut state, &eval, &stamp);
            doc.write(&state)?;
            Ok(eval)
        })?;

        let mut evaluation = evaluation;
        if proposal {
            evaluation.proposed_action = self.paths.actions().propose(
                CHECKPOINT_TITLE,
                "Repository has uncommitted changes for long duration",
                vec![
                    "git add .".into(),
                    format!("git commit -m \"{CHECKPOINT_MESSAGE}\""),
                    "git push".into(),
                ],
            )?;
        }
        tracing::info!(
            decision = %evaluation.decision,
            proposed_action = evaluation.proposed_action,
            "brain evaluated"
        );
        Ok(evaluation)
    }

    fn update(&self, f: impl FnOnce(&mut SystemState)) -> Result<SystemState> {
        self.state.locked(|doc| {
            let mut state = doc.read()?.unwrap_or_default();
            f(&mut state);
            doc.write(&state)?;
            Ok(state)
        })
    }

    fn detect_failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        let data = &self.paths.data_dir;
        if !data.is_dir() {
            failures.push("Dataset folder missing".to_string());
        } else if dir_is_empty(data) {
            failures.push("Dataset folder exists but empty".to_string());
        }
        if !self.paths.models_dir.is_dir() {
            failures.push("Models folder missing".to_string());
        }
        if !self.paths.root.join(".git").exists() {
            failures.push("Git repository missing".to_string());
        }
        if let Ok(entries) = fs::read_dir(&self.paths.docs_dir) {
            let mut crash_logs: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
                .collect();
            crash_logs.sort();
            failures.extend(
                crash_logs
                    .into_iter()
                    .map(|name| format!("Crash log detected: {name}")),
            );
        }
        failures
    }

    fn log_failures(&self, failures: &[String], stamp: &str) -> Result<()> {
        let path = &self.paths.failures_log;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut body = format!(
            "\n\n---\n\nDate: {stamp}\nFailure Title: Automatic system detection\nWhat Happened:\n"
        );
        for failure in failures {
            body.push_str(&format!("- {failure}\n"));
        }
        body.push_str("\nRoot Cause:\nStructural issue detected\n");
        body.push_str("\nFix Applied:\nPending\n");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    fn observe_git(&self, state: &mut SystemState, runner: &dyn CommandRunner, now: DateTime<Local>) {
        let status = match runner.run("git status --porcelain") {
            Ok(out) if out.success() && out.stdout.trim().is_empty() => GitStatus::Clean,
            Ok(out) if out.success() => GitStatus::Changes,
            Ok(out) => {
                tracing::warn!(code = ?out.code, "git status failed: {}", out.stderr.trim());
                GitStatus::Unknown
            }
            Err(err) => {
                tracing::warn!("git status could not run: {err}");
                GitStatus::Unknown
            }
        };
        state.git_status = Some(status);
        state.git_dirty_minutes = if status == GitStatus::Changes {
            minutes_since_last_commit(runner, now).unwrap_or(0)
        } else {
            0
        };
    }

    fn project_intelligence(&self, state: &mut SystemState, stamp: &str) -> Option<Evaluation> {
        if state.project_stage.as_deref() != Some(STAGE_DATA_COLLECTION) {
            return None;
        }
        let real_world = self.paths.data_dir.join("real_world");
        let (decision, message) = if !real_world.is_dir() {
            (
                Decision::CreateDataset,
                "Create real-world dataset folders.".to_string(),
            )
        } else {
            let images = count_images(&real_world);
            if images < self.thresholds.min_dataset_images {
                (
                    Decision::CollectDataset,
                    format!("Dataset small ({images} images). Capture more real images."),
                )
            } else {
                state.project_stage = Some(STAGE_TRAINING_READY.into());
                state.next_engineering_step = Some("Retrain model with real dataset".into());
                state.last_progress_update = Some(stamp.to_string());
                state.step_stale_days = 0;
                (
                    Decision::ReadyForTraining,
                    "Dataset sufficient. Ready for retraining.".to_string(),
                )
            }
        };
        Some(Evaluation {
            decision,
            message,
            failures: Vec::new(),
            proposed_action: false,
        })
    }

    fn engineering_health(&self, state: &SystemState) -> Evaluation {
        let t = &self.thresholds;
        let (decision, message) = if state.session_runtime_min > t.max_session_minutes {
            (Decision::SuggestBreak, "Long session detected. Take 5 min reset.")
        } else if state.git_dirty_minutes > t.max_dirty_minutes {
            (Decision::SuggestCommit, "Safe checkpoint recommended.")
        } else if state.step_stale_days >= t.max_stale_days {
            (Decision::ReviewDirection, "Same step too long. Review direction.")
        } else {
            (Decision::Continue, "System stable. Continue.")
        };
        Evaluation {
            decision,
            message: message.to_string(),
            failures: Vec::new(),
            proposed_action: false,
        }
    }
}

fn record(state: &mut SystemState, eval: &Evaluation, stamp: &str) {
    state.autonomous_decision = Some(eval.decision);
    state.autonomous_message = Some(eval.message.clone());
    state.last_decision_time = Some(stamp.to_string());
}

fn minutes_between(stamp: &str, now: DateTime<Local>) -> u64 {
    let Ok(naive) = NaiveDateTime::parse_from_str(stamp, MINUTE_FORMAT) else {
        tracing::warn!("unparseable timestamp in system state: {stamp}");
        return 0;
    };
    let Some(then) = Local.from_local_datetime(&naive).earliest() else {
        return 0;
    };
    u64::try_from((now - then).num_minutes()).unwrap_or(0)
}

fn minutes_since_last_commit(runner: &dyn CommandRunner, now: DateTime<Local>) -> Option<u64> {
    let out = runner.run("git log -1 --format=%cI").ok()?;
    if !out.success() {
        return None;
    }
    let committed = DateTime::parse_from_rfc3339(out.stdout.trim()).ok()?;
    u64::try_from((now.fixed_offset() - committed).num_minutes()).ok()
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn count_images(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStatus;
    use crate::exec::test_support::ScriptedRunner;
    use tempfile::TempDir;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn healthy_lab(dir: &TempDir) -> LabPaths {
        let paths = LabPaths::under(dir.path());
        fs::create_dir_all(paths.data_dir.join("banana_ripeness")).unwrap();
        fs::create_dir_all(&paths.models_dir).unwrap();
        fs::create_dir_all(paths.root.join(".git")).unwrap();
        paths
    }

    fn write_state(paths: &LabPaths, state: &SystemState) {
        JsonDocument::new(&paths.system_state).write(state).unwrap();
    }

    fn commit_minutes_ago(mins: i64) -> String {
        (now() - chrono::Duration::minutes(mins)).to_rfc3339()
    }

    #[test]
    fn structural_failures_take_priority() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        fs::create_dir_all(&paths.data_dir).unwrap();
        fs::create_dir_all(&paths.docs_dir).unwrap();
        fs::write(paths.docs_dir.join("train_crash.log"), "boom").unwrap();
        let runner = ScriptedRunner::default();

        let brain = Brain::new(&paths, BrainThresholds::default());
        let eval = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(eval.decision, Decision::SystemAttention);
        assert_eq!(
            eval.failures,
            vec![
                "Dataset folder exists but empty",
                "Models folder missing",
                "Git repository missing",
                "Crash log detected: train_crash.log"
            ]
        );
        assert!(runner.calls().is_empty());

        let state = brain.state();
        assert_eq!(state.system_health.as_deref(), Some("attention"));
        assert_eq!(state.last_decision_time.as_deref(), Some("2025-06-01 12:00"));
        let log = fs::read_to_string(&paths.failures_log).unwrap();
        assert!(log.contains("- Models folder missing"));
    }

    #[test]
    fn clean_tree_continues() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        let eval = Brain::new(&paths, BrainThresholds::default())
            .evaluate(&ScriptedRunner::default(), now())
            .unwrap();
        assert_eq!(eval.decision, Decision::Continue);
        assert!(!eval.proposed_action);
        let state = Brain::new(&paths, BrainThresholds::default()).state();
        assert_eq!(state.git_status, Some(GitStatus::Clean));
        assert_eq!(state.system_health.as_deref(), Some("stable"));
    }

    #[test]
    fn long_dirty_tree_proposes_single_checkpoint_action() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        let runner = ScriptedRunner::default()
            .reply("git status --porcelain", 0, " M src/lib.rs\n", "")
            .reply("git log -1 --format=%cI", 0, &commit_minutes_ago(90), "");
        let brain = Brain::new(&paths, BrainThresholds::default());

        let eval = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(eval.decision, Decision::SuggestCommit);
        assert!(eval.proposed_action);
        assert_eq!(brain.state().git_dirty_minutes, 90);

        let action = paths.actions().show().unwrap().unwrap();
        assert_eq!(action.title, CHECKPOINT_TITLE);
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.commands.len(), 3);

        let again = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(again.decision, Decision::SuggestCommit);
        assert!(!again.proposed_action);
    }

    #[test]
    fn session_runtime_beats_dirty_tree() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        let brain = Brain::new(&paths, BrainThresholds::default());
        brain
            .start_session(now() - chrono::Duration::minutes(150))
            .unwrap();
        let runner = ScriptedRunner::default()
            .reply("git status --porcelain", 0, "?? new.txt\n", "")
            .reply("git log -1 --format=%cI", 0, &commit_minutes_ago(90), "");

        let eval = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(eval.decision, Decision::SuggestBreak);
        assert!(!eval.proposed_action);
        assert!(paths.actions().show().unwrap().is_none());

        let closed = brain.close_session(now()).unwrap();
        assert!(closed.session_started_at.is_none());
        assert_eq!(closed.session_runtime_min, 150);
    }

    #[test]
    fn stale_step_requests_review() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        write_state(
            &paths,
            &SystemState {
                last_progress_update: Some("2025-05-27 11:00".into()),
                ..SystemState::default()
            },
        );
        let eval = Brain::new(&paths, BrainThresholds::default())
            .evaluate(&ScriptedRunner::default(), now())
            .unwrap();
        assert_eq!(eval.decision, Decision::ReviewDirection);
    }

    #[test]
    fn data_collection_stage_tracks_dataset_size() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        write_state(
            &paths,
            &SystemState {
                project_stage: Some(STAGE_DATA_COLLECTION.into()),
                ..SystemState::default()
            },
        );
        let thresholds = BrainThresholds {
            min_dataset_images: 3,
            ..BrainThresholds::default()
        };
        let brain = Brain::new(&paths, thresholds);
        let runner = ScriptedRunner::default();

        assert_eq!(
            brain.evaluate(&runner, now()).unwrap().decision,
            Decision::CreateDataset
        );

        let raw = paths.data_dir.join("real_world").join("raw");
        fs::create_dir_all(&raw).unwrap();
        fs::write(raw.join("a.jpg"), b"").unwrap();
        fs::write(raw.join("b.PNG"), b"").unwrap();
        fs::write(raw.join("notes.txt"), b"").unwrap();
        let eval = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(eval.decision, Decision::CollectDataset);
        assert!(eval.message.contains("(2 images)"));

        fs::write(raw.join("c.jpeg"), b"").unwrap();
        let eval = brain.evaluate(&runner, now()).unwrap();
        assert_eq!(eval.decision, Decision::ReadyForTraining);
        let state = brain.state();
        assert_eq!(state.project_stage.as_deref(), Some(STAGE_TRAINING_READY));
        assert_eq!(state.last_progress_update.as_deref(), Some("2025-06-01 12:00"));
    }

    #[test]
    fn unknown_state_fields_survive_evaluation() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        fs::create_dir_all(&paths.state_dir).unwrap();
        fs::write(
            &paths.system_state,
            r#"{"active_project": "Banana Ripeness Detection AI", "focus_state": "deep"}"#,
        )
        .unwrap();
        let brain = Brain::new(&paths, BrainThresholds::default());
        brain.evaluate(&ScriptedRunner::default(), now()).unwrap();
        let state = brain.state();
        assert_eq!(
            state.extra.get("active_project"),
            Some(&Value::from("Banana Ripeness Detection AI"))
        );
        assert_eq!(state.autonomous_decision, Some(Decision::Continue));
    }

    #[test]
    fn git_failure_marks_status_unknown() {
        let dir = TempDir::new().unwrap();
        let paths = healthy_lab(&dir);
        let runner =
            ScriptedRunner::default().reply("git status --porcelain", 128, "", "not a git repo");
        let brain = Brain::new(&paths, BrainThresholds::default());
        brain.evaluate(&runner, now()).unwrap();
        let state = brain.state();
        assert_eq!(state.git_status, Some(GitStatus::Unknown));
        assert_eq!(state.git_dirty_minutes, 0);
    }
}
