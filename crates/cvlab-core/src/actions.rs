//! Single-slot, human-approved queue for automation-proposed shell commands.
//!
//! Status only moves forward: pending -> approved -> executed.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{LabError, Result};
use crate::exec::{CommandOutput, CommandRunner};
use crate::journal::{Journal, JournalEvent};
use crate::store::JsonDocument;
use crate::topics;
use crate::util::{append_text, minute_stamp, second_stamp};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Executed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Approved => "approved",
            ActionStatus::Executed => "executed",
        }
    }

    /// Pending and approved actions block new proposals.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::Approved)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    pub title: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub commands: Vec<String>,
    pub status: ActionStatus,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommandResult {
    pub command: String,
    #[serde(flatten)]
    pub output: CommandOutput,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionReport {
    pub title: String,
    pub results: Vec<CommandResult>,
}

impl ExecutionReport {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.output.success()).count()
    }
}

/// Result of [`ActionQueue::execute`].
#[derive(Clone, Debug)]
pub enum ExecuteOutcome {
    NoAction,
    NotApproved(ActionStatus),
    Executed(ExecutionReport),
}

pub struct ActionQueue {
    doc: JsonDocument<PendingAction>,
    log_path: PathBuf,
    journal: Option<Journal>,
}

impl ActionQueue {
    pub fn new(action_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(action_path),
            log_path: log_path.into(),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn show(&self) -> Result<Option<PendingAction>> {
        self.doc.read()
    }

    /// Write a new pending action unless one is already pending or approved.
    ///
    /// Returns `false` when an outstanding action blocked the proposal. An
    /// unreadable document is logged and treated as "nothing outstanding".
    pub fn propose(&self, title: &str, reason: &str, commands: Vec<String>) -> Result<bool> {
        let created = self.doc.locked(|doc| {
            let current = match doc.read() {
                Ok(current) => current,
                Err(err @ LabError::DataCorruption { .. }) => {
                    tracing::warn!("replacing unreadable pending action: {err}");
                    None
                }
                Err(err) => return Err(err),
            };
            if let Some(existing) = current.filter(|a| a.status.is_outstanding()) {
                tracing::info!(
                    title = %existing.title,
                    status = %existing.status,
                    "action already outstanding; proposal skipped"
                );
                return Ok(false);
            }
            doc.write(&PendingAction {
                title: title.to_string(),
                reason: reason.to_string(),
                commands,
                status: ActionStatus::Pending,
                created_at: minute_stamp(Local::now()),
            })?;
            Ok(true)
        })?;
        if created {
            tracing::info!(%title, "pending action created");
        }
        Ok(created)
    }

    /// Move a pending action to approved. `Ok(false)` when there is nothing to approve.
    pub fn approve(&self) -> Result<bool> {
        self.doc.locked(|doc| {
            let Some(mut action) = doc.read()? else {
                tracing::info!("no pending action to approve");
                return Ok(false);
            };
            if action.status != ActionStatus::Pending {
                return Err(LabError::invalid_state(format!(
                    "action '{}' is {}; only pending actions can be approved",
                    action.title, action.status
                )));
            }
            action.status = ActionStatus::Approved;
            doc.write(&action)?;
            tracing::info!(title = %action.title, "action approved");
            Ok(true)
        })
    }

    /// Run every command of an approved action in order, then mark it executed.
    ///
    /// Failures are logged and do not stop the batch; the action is finalized
    /// regardless. The document lock is held for the whole run so two executors
    /// cannot both run the batch.
    pub fn execute(&self, runner: &dyn CommandRunner) -> Result<ExecuteOutcome> {
        let outcome = self.doc.locked(|doc| {
            let Some(mut action) = doc.read()? else {
                tracing::info!("no pending action");
                return Ok(ExecuteOutcome::NoAction);
            };
            if action.status != ActionStatus::Approved {
                tracing::info!(status = %action.status, "action not approved yet");
                return Ok(ExecuteOutcome::NotApproved(action.status));
            }

            self.log(&format!("EXECUTING: {}", action.title));
            let mut results = Vec::with_capacity(action.commands.len());
            for command in &action.commands {
                self.log(&format!("CMD: {command}"));
                let output = match runner.run(command) {
                    Ok(output) => output,
                    Err(err) => CommandOutput {
                        code: None,
                        stdout: String::new(),
                        stderr: err.to_string(),
                    },
                };
                self.log(&output.stdout);
                self.log(&output.stderr);
                if !output.success() {
                    tracing::warn!(%command, code = ?output.code, "action command failed; continuing");
                }
                results.push(CommandResult {
                    command: command.clone(),
                    output,
                });
            }

            action.status = ActionStatus::Executed;
            doc.write(&action)?;
            Ok(ExecuteOutcome::Executed(ExecutionReport {
                title: action.title,
                results,
            }))
        })?;

        if let ExecuteOutcome::Executed(report) = &outcome {
            let codes: Vec<_> = report.results.iter().map(|r| json!(r.output.code)).collect();
            tracing::info!(title = %report.title, failed = report.failed(), "action executed");
            if let Some(journal) = &self.journal {
                journal.record(
                    JournalEvent::new(
                        topics::EVENT_ACTION_EXECUTED,
                        format!("Executed: {}", report.title),
                        format!(
                            "{} command(s) run, {} failed.",
                            report.results.len(),
                            report.failed()
                        ),
                    )
                    .with_meta("exit_codes", codes),
                );
            }
        }
        Ok(outcome)
    }

    /// Log writes never abort a batch: commands that already ran must still be finalized.
    fn log(&self, text: &str) {
        if let Err(err) = append_text(&self.log_path, Some(&second_stamp(Local::now())), text) {
            tracing::warn!(log = %self.log_path.display(), "execution log write failed: {err}");
        }
    }
}
