//! Git safe checkpoint: stage, commit and push the working tree.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::Result;
use crate::exec::{display_argv, CommandOutput, CommandRunner};
use crate::journal::Journal;
use crate::topics::AUTO_COMMIT_EVENTS;
use crate::util::minute_stamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckpointOutcome {
    /// Working tree was clean; nothing was run past `git status`.
    NoChanges,
    Pushed { message: String },
    /// Commit exists locally but `git push` failed.
    CommittedNotPushed { message: String, push_error: String },
}

fn git(runner: &dyn CommandRunner, args: &[&str]) -> Result<CommandOutput> {
    runner.run_argv("git", args)
}

fn git_checked(runner: &dyn CommandRunner, args: &[&str]) -> Result<CommandOutput> {
    git(runner, args)?.check(&display_argv("git", args))
}

pub fn has_changes(runner: &dyn CommandRunner) -> Result<bool> {
    let out = git_checked(runner, &["status", "--porcelain"])?;
    Ok(!out.stdout.trim().is_empty())
}

/// Commit every change with `message` and push it.
///
/// A failed commit is an error. A failed push is reported in the outcome and
/// leaves the local commit in place.
pub fn checkpoint(runner: &dyn CommandRunner, message: &str) -> Result<CheckpointOutcome> {
    if !has_changes(runner)? {
        tracing::info!("checkpoint skipped: working tree clean");
        return Ok(CheckpointOutcome::NoChanges);
    }
    git_checked(runner, &["add", "."])?;
    git_checked(runner, &["commit", "-m", message])?;

    let push = git(runner, &["push"])?;
    if push.success() {
        tracing::info!(%message, "checkpoint committed and pushed");
        Ok(CheckpointOutcome::Pushed {
            message: message.to_string(),
        })
    } else {
        let push_error = push.stderr.trim().to_string();
        tracing::warn!(%message, "checkpoint committed locally, push failed: {push_error}");
        Ok(CheckpointOutcome::CommittedNotPushed {
            message: message.to_string(),
            push_error,
        })
    }
}

/// Checkpoint after a milestone event. Returns `None` when the latest journal
/// event is not one of [`AUTO_COMMIT_EVENTS`].
pub fn auto_commit_for_latest_event(
    journal: &Journal,
    runner: &dyn CommandRunner,
    now: DateTime<Local>,
) -> Result<Option<CheckpointOutcome>> {
    let Some(event) = journal.latest()? else {
        return Ok(None);
    };
    if !AUTO_COMMIT_EVENTS.contains(&event.event_type.as_str()) {
        tracing::debug!(event = %event.event_type, "latest event does not trigger a checkpoint");
        return Ok(None);
    }
    let message = format!(
        "{} [{}]",
        event.event_type.to_lowercase().replace('_', " "),
        minute_stamp(now)
    );
    checkpoint(runner, &message).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LabError;
    use crate::exec::test_support::ScriptedRunner;
    use crate::journal::JournalEvent;
    use crate::topics;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn dirty() -> ScriptedRunner {
        ScriptedRunner::default().reply("git status --porcelain", 0, " M a.txt\n", "")
    }

    #[test]
    fn clean_tree_is_skipped() {
        let runner = ScriptedRunner::default();
        assert_eq!(
            checkpoint(&runner, "msg").unwrap(),
            CheckpointOutcome::NoChanges
        );
        assert_eq!(runner.calls(), vec!["git status --porcelain"]);
    }

    #[test]
    fn commits_and_pushes() {
        let runner = dirty();
        let outcome = checkpoint(&runner, "say \"hi\"").unwrap();
        assert_eq!(
            outcome,
            CheckpointOutcome::Pushed {
                message: "say \"hi\"".into()
            }
        );
        assert_eq!(
            runner.calls(),
            vec![
                "git status --porcelain",
                "git add .",
                "git commit -m say \"hi\"",
                "git push"
            ]
        );
    }

    #[test]
    fn push_failure_keeps_commit() {
        let runner = dirty().reply("git push", 1, "", "no upstream\n");
        match checkpoint(&runner, "wip").unwrap() {
            CheckpointOutcome::CommittedNotPushed { push_error, .. } => {
                assert_eq!(push_error, "no upstream")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn commit_failure_is_fatal() {
        let runner = dirty().reply("git commit -m wip", 1, "", "nothing added");
        let err = checkpoint(&runner, "wip").unwrap_err();
        assert!(matches!(
            err,
            LabError::ExternalCommandFailure { code: Some(1), .. }
        ));
        assert!(!runner.calls().contains(&"git push".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn shell_metacharacters_reach_git_unexpanded() {
        use crate::exec::ShellRunner;
        use std::process::Command;

        let dir = TempDir::new().unwrap();
        let setup = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?}");
        };
        setup(&["init", "-q"]);
        setup(&["config", "user.name", "cvlab"]);
        setup(&["config", "user.email", "cvlab@example.invalid"]);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let message = "bump cost to $HOME and `echo INJECTED` $(id -u)";
        let runner = ShellRunner::new(dir.path());
        match checkpoint(&runner, message).unwrap() {
            CheckpointOutcome::CommittedNotPushed { message: m, .. }
            | CheckpointOutcome::Pushed { message: m } => assert_eq!(m, message),
            other => panic!("unexpected outcome {other:?}"),
        }
        let subject = runner
            .run_argv("git", &["log", "-1", "--format=%s"])
            .unwrap();
        assert_eq!(subject.stdout.trim_end(), message);
    }

    #[test]
    fn auto_commit_follows_milestone_events_only() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::new(
            dir.path().join("journal_events.json"),
            dir.path().join("dev_journal.md"),
        );
        let now = Local.with_ymd_and_hms(2025, 6, 1, 9, 5, 0).unwrap();
        let runner = dirty();

        assert_eq!(
            auto_commit_for_latest_event(&journal, &runner, now).unwrap(),
            None
        );

        journal
            .append(JournalEvent::new(topics::EVENT_ACTION_EXECUTED, "ran", ""))
            .unwrap();
        assert_eq!(
            auto_commit_for_latest_event(&journal, &runner, now).unwrap(),
            None
        );
        assert!(runner.calls().is_empty());

        journal
            .append(JournalEvent::new(topics::EVENT_PRODUCTION_SET, "set", ""))
            .unwrap();
        let outcome = auto_commit_for_latest_event(&journal, &runner, now).unwrap();
        assert_eq!(
            outcome,
            Some(CheckpointOutcome::Pushed {
                message: "production set [2025-06-01 09:05]".into()
            })
        );
    }
}
