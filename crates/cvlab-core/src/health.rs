use serde::Serialize;

use crate::config::LabPaths;
use crate::exec::CommandRunner;
use crate::inference::resolve_production;
use crate::registry::RegistryStore;

const UNMERGED_MARKERS: [&str; 3] = ["UU ", "AA ", "DD "];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    IssuesFound,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub checks_passed: u32,
    pub checks_failed: u32,
}

#[derive(Default)]
struct Tally {
    issues: Vec<String>,
    passed: u32,
    failed: u32,
}

impl Tally {
    fn pass(&mut self) {
        self.passed += 1;
    }

    fn fail(&mut self, issue: impl Into<String>) {
        self.failed += 1;
        self.issues.push(issue.into());
    }

    fn finish(self) -> HealthReport {
        HealthReport {
            status: if self.failed == 0 {
                HealthStatus::Healthy
            } else {
                HealthStatus::IssuesFound
            },
            issues: self.issues,
            checks_passed: self.passed,
            checks_failed: self.failed,
        }
    }
}

/// Local audit of git state, registry integrity and journal readability.
pub fn check(paths: &LabPaths, runner: &dyn CommandRunner) -> HealthReport {
    let mut tally = Tally::default();

    match runner.run("git status --porcelain") {
        Ok(out) if out.success() => {
            tally.pass();
            let conflicted = out.stdout.lines().any(|line| {
                UNMERGED_MARKERS
                    .iter()
                    .any(|marker| line.starts_with(marker))
            });
            if conflicted {
                tally.fail("Unresolved merge conflict detected");
            } else {
                tally.pass();
            }
        }
        Ok(_) | Err(_) => tally.fail("Git repository status check failed"),
    }

    let store = RegistryStore::new(&paths.registry);
    if !store.path().exists() {
        tally.fail("model_registry.json is missing");
    } else {
        match store.load() {
            Ok(registry) => {
                tally.pass();
                for issue in registry.integrity_issues() {
                    tally.fail(issue);
                }
                if registry.production_model.is_some() {
                    match resolve_production(&registry, paths) {
                        Ok((_, artifact)) if artifact.exists() => tally.pass(),
                        Ok((record, _)) => {
                            tally.fail(format!("Production model file not found: {}", record.path))
                        }
                        // Dangling and dev-mode pointers are already reported by integrity_issues.
                        Err(_) => {}
                    }
                }
            }
            Err(_) => tally.fail("model_registry.json is invalid JSON"),
        }
    }

    let journal = paths.journal();
    if !journal.json_path().exists() {
        tally.fail("journal_events.json missing");
    } else if journal.read_all().is_err() {
        tally.fail("journal_events.json is corrupted");
    } else {
        tally.pass();
    }

    let report = tally.finish();
    tracing::info!(
        status = ?report.status,
        passed = report.checks_passed,
        failed = report.checks_failed,
        "health check complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::ScriptedRunner;
    use crate::journal::JournalEvent;
    use crate::registry::{ExperimentRecord, TrainingMode};
    use std::fs;
    use tempfile::TempDir;

    fn seeded(dir: &TempDir, with_artifact: bool) -> LabPaths {
        let paths = LabPaths::under(dir.path());
        let store = paths.registry();
        store
            .append(ExperimentRecord {
                exp_id: "EXP-a".into(),
                path: "outputs/EXP-a/model.keras".into(),
                val_accuracy: 0.9,
                mode: TrainingMode::Full,
                member: "ana".into(),
            })
            .unwrap();
        store.promote("EXP-a").unwrap();
        if with_artifact {
            let p = paths.resolve("outputs/EXP-a/model.keras");
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, b"w").unwrap();
        }
        paths
    }

    #[test]
    fn healthy_lab_passes_every_check() {
        let dir = TempDir::new().unwrap();
        let paths = seeded(&dir, true);
        let report = check(&paths, &ScriptedRunner::default());
        assert_eq!(report.status, HealthStatus::Healthy, "{:?}", report.issues);
        assert_eq!(report.checks_failed, 0);
        assert_eq!(report.checks_passed, 5);
    }

    #[test]
    fn reports_missing_artifact_and_conflicts() {
        let dir = TempDir::new().unwrap();
        let paths = seeded(&dir, false);
        let runner = ScriptedRunner::default().reply(
            "git status --porcelain",
            0,
            "UU src/lib.rs\n M README.md\n",
            "",
        );
        let report = check(&paths, &runner);
        assert_eq!(report.status, HealthStatus::IssuesFound);
        assert!(report
            .issues
            .contains(&"Unresolved merge conflict detected".to_string()));
        assert!(report
            .issues
            .iter()
            .any(|i| i.starts_with("Production model file not found")));
    }

    #[test]
    fn reports_missing_and_corrupt_documents() {
        let dir = TempDir::new().unwrap();
        let paths = LabPaths::under(dir.path());
        let runner = ScriptedRunner::default().reply("git status --porcelain", 128, "", "fatal");
        let report = check(&paths, &runner);
        assert_eq!(report.checks_passed, 0);
        assert_eq!(
            report.issues,
            vec![
                "Git repository status check failed",
                "model_registry.json is missing",
                "journal_events.json missing"
            ]
        );

        fs::create_dir_all(paths.registry.parent().unwrap()).unwrap();
        fs::write(&paths.registry, "{").unwrap();
        paths
            .journal()
            .append(JournalEvent::new("TEST", "t", "d"))
            .unwrap();
        fs::write(&paths.journal_json, "[").unwrap();
        let report = check(&paths, &runner);
        assert!(report
            .issues
            .contains(&"model_registry.json is invalid JSON".to_string()));
        assert!(report
            .issues
            .contains(&"journal_events.json is corrupted".to_string()));
    }
}
