//! Shell collaborator: runs one command line and reports exit status plus output.

use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;

use crate::error::{LabError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into [`LabError::ExternalCommandFailure`].
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(LabError::ExternalCommandFailure {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub trait CommandRunner {
    /// Run `command`. `Err` means the command could not be started at all.
    fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Run `program` with `args` passed verbatim; nothing is shell-parsed.
    fn run_argv(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Human-readable form of an argv invocation, used in logs and errors.
pub fn display_argv(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn collect(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Runs command lines through the platform shell inside a working directory.
#[derive(Clone, Debug)]
pub struct ShellRunner {
    cwd: PathBuf,
}

impl ShellRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        tracing::debug!(%command, cwd = %self.cwd.display(), "running shell command");
        let output = cmd.current_dir(&self.cwd).output()?;
        Ok(collect(output))
    }

    fn run_argv(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(%program, ?args, cwd = %self.cwd.display(), "running command");
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .output()?;
        Ok(collect(output))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted runner: replies from a table keyed by command, records every call.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: HashMap<String, CommandOutput>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn reply(mut self, command: &str, code: i32, stdout: &str, stderr: &str) -> Self {
            self.replies.insert(
                command.to_string(),
                CommandOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run_argv(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.run(&display_argv(program, args))
        }

        fn run(&self, command: &str) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(command.to_string());
            Ok(self.replies.get(command).cloned().unwrap_or(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn shell_runner_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::new(dir.path());
        let ok = runner.run("echo hello && echo oops 1>&2").unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout, "hello\n");
        assert_eq!(ok.stderr, "oops\n");

        let failed = runner.run("exit 3").unwrap();
        assert_eq!(failed.code, Some(3));
        assert!(matches!(
            failed.check("exit 3"),
            Err(LabError::ExternalCommandFailure { code: Some(3), .. })
        ));
    }

    #[test]
    fn argv_runner_passes_metacharacters_verbatim() {
        let dir = TempDir::new().unwrap();
        let out = ShellRunner::new(dir.path())
            .run_argv("printf", &["%s", "cost $HOME `echo x` $(id)"])
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "cost $HOME `echo x` $(id)");
    }

    #[test]
    fn shell_runner_uses_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let out = ShellRunner::new(dir.path()).run("ls").unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }
}
