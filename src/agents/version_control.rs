use crate::error::{CubeError, Result};
use crate::utils::path_validator::PathValidator;
use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Mercurial,
}

impl VcsKind {
    fn program(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Mercurial => "hg",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Git => "Git",
            Self::Mercurial => "Mercurial",
        };
        f.write_str(label)
    }
}

/// The working-tree operations an upgrade run needs.
pub trait VersionControl {
    /// True when tracked files carry no uncommitted change. Untracked files
    /// (such as the log directory) are ignored.
    fn is_clean(&self) -> Result<bool>;

    /// Drop every uncommitted change to tracked files.
    fn revert_all(&self) -> Result<()>;

    /// Commit every change to tracked files, returning the message used.
    fn commit(&self, message: &str) -> Result<String>;

    /// Tracked files, relative to the project directory.
    fn tracked_files(&self) -> Result<Vec<PathBuf>>;
}

/// VersionControlAgent shells out to `git` or `hg` with validated paths.
pub struct VersionControlAgent {
    kind: VcsKind,
    project_path: PathBuf,
    verbose: bool,
}

impl VersionControlAgent {
    pub fn new<P: AsRef<Path>>(kind: VcsKind, project_path: P, verbose: bool) -> Result<Self> {
        let project_path = Self::validate_repository_path(project_path.as_ref())?;
        Ok(Self {
            kind,
            project_path,
            verbose,
        })
    }

    fn clean_check_args(&self) -> &'static [&'static str] {
        match self.kind {
            VcsKind::Git => &["status", "--porcelain", "--untracked-files=no"],
            VcsKind::Mercurial => &["diff"],
        }
    }

    fn revert_args(&self) -> &'static [&'static str] {
        match self.kind {
            VcsKind::Git => &["reset", "--hard", "--quiet"],
            VcsKind::Mercurial => &["revert", "--all", "--no-backup"],
        }
    }

    fn commit_args<'a>(&self, message: &'a str) -> Vec<&'a str> {
        match self.kind {
            VcsKind::Git => vec!["commit", "--all", "--quiet", "-m", message],
            VcsKind::Mercurial => vec!["commit", "-m", message],
        }
    }

    fn tracked_files_args(&self) -> &'static [&'static str] {
        match self.kind {
            VcsKind::Git => &["ls-files"],
            VcsKind::Mercurial => &["files", "."],
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        if self.verbose {
            eprintln!(
                "{} {} {}",
                "[VERBOSE]".dimmed(),
                self.kind.program(),
                args.join(" ")
            );
        }

        Command::new(self.kind.program())
            .current_dir(&self.project_path)
            .args(args)
            .output()
            .map_err(|e| {
                CubeError::VersionControl(format!(
                    "Failed to execute '{} {}': {e}",
                    self.kind.program(),
                    args.join(" ")
                ))
            })
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(output);
        }

        Err(CubeError::VersionControl(format!(
            "{} {} failed: {}",
            self.kind.program(),
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    fn validate_repository_path(path: &Path) -> Result<PathBuf> {
        let dangerous = [';', '|', '&', '$', '`', '\n', '\r'];
        let path_str = path.to_string_lossy();
        if let Some(ch) = dangerous.iter().find(|c| path_str.contains(**c)) {
            return Err(CubeError::VersionControl(format!(
                "Path contains dangerous character: '{}'",
                ch
            )));
        }

        if !path.is_absolute() {
            return Err(CubeError::VersionControl(
                "Only absolute paths are allowed for version control operations".to_string(),
            ));
        }

        PathValidator::project_root(path)
            .map_err(|err| CubeError::VersionControl(format!("Invalid repository path: {err}")))
    }
}

fn parse_file_list(stdout: &[u8]) -> Vec<PathBuf> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl VersionControl for VersionControlAgent {
    fn is_clean(&self) -> Result<bool> {
        let output = self.run_checked(self.clean_check_args())?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn revert_all(&self) -> Result<()> {
        self.run_checked(self.revert_args())?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.run_checked(&self.commit_args(message))?;
        Ok(message.to_string())
    }

    fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        let output = self.run_checked(self.tracked_files_args())?;
        Ok(parse_file_list(&output.stdout))
    }
}
