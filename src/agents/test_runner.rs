use crate::error::{CubeError, Result};
use colored::Colorize;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

/// How a test command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// Non-zero exit; `None` when the process was killed by a signal.
    Failed(Option<i32>),
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

pub trait TestRunner {
    /// Run `command` in the working tree, sending stdout and stderr to `log_path`.
    fn run(&self, command: &str, log_path: &Path) -> Result<TestOutcome>;
}

/// ShellTestRunner executes test commands through the platform shell
pub struct ShellTestRunner {
    working_dir: std::path::PathBuf,
    verbose: bool,
}

impl ShellTestRunner {
    pub fn new<P: AsRef<Path>>(working_dir: P, verbose: bool) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            verbose,
        }
    }

    fn shell_command(command: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut shell = Command::new("cmd");
            shell.args(["/C", command]);
            shell
        } else {
            let mut shell = Command::new("sh");
            shell.args(["-c", command]);
            shell
        }
    }
}

impl TestRunner for ShellTestRunner {
    fn run(&self, command: &str, log_path: &Path) -> Result<TestOutcome> {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // The child writes straight into the file: nothing is buffered on our
        // side, so a hanging command can be inspected with `tail -f`.
        let stdout = File::create(log_path)?;
        let stderr = stdout.try_clone()?;

        if self.verbose {
            eprintln!(
                "{} Executing: {} (in {})",
                "[VERBOSE]".dimmed(),
                command,
                self.working_dir.display()
            );
        }

        let status = Self::shell_command(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|e| CubeError::TestExecution(format!("Failed to spawn '{command}': {e}")))?;

        if status.success() {
            Ok(TestOutcome::Passed)
        } else {
            Ok(TestOutcome::Failed(status.code()))
        }
    }
}
