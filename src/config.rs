use crate::error::{CubeError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".cubetoolkit.toml";
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";
pub const DEFAULT_LOG_DIR: &str = "autoupgradedependencies";
pub const DEFAULT_CUBE_PREFIX: &str = "cubicweb-";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which version control backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsChoice {
    #[default]
    Auto,
    Git,
    Hg,
}

impl FromStr for VcsChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "git" => Ok(Self::Git),
            "hg" | "mercurial" => Ok(Self::Hg),
            other => Err(format!("unknown VCS '{other}', expected auto, git or hg")),
        }
    }
}

impl fmt::Display for VcsChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Auto => "auto",
            Self::Git => "git",
            Self::Hg => "hg",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    upgrade: UpgradeSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpgradeSection {
    index_url: Option<String>,
    log_dir: Option<PathBuf>,
    cube_prefix: Option<String>,
    timeout_secs: Option<u64>,
    vcs: Option<VcsChoice>,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub index_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub cube_prefix: Option<String>,
    pub timeout_secs: Option<u64>,
    pub vcs: Option<VcsChoice>,
    pub verbose: bool,
}

/// Fully resolved settings: CLI over `.cubetoolkit.toml` over defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub index_url: String,
    pub log_dir: PathBuf,
    pub cube_prefix: String,
    pub timeout: Duration,
    pub vcs: VcsChoice,
    pub verbose: bool,
}

impl Settings {
    pub fn load(project_path: &Path, overrides: Overrides) -> Result<Self> {
        let file = Self::read_config_file(&project_path.join(CONFIG_FILE_NAME))?;
        Self::resolve(project_path, file.upgrade, overrides)
    }

    fn read_config_file(path: &Path) -> Result<ConfigFile> {
        if !path.exists() {
            return Ok(ConfigFile::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            CubeError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn resolve(project_path: &Path, file: UpgradeSection, cli: Overrides) -> Result<Self> {
        let cube_prefix = cli
            .cube_prefix
            .or(file.cube_prefix)
            .unwrap_or_else(|| DEFAULT_CUBE_PREFIX.to_string());
        if cube_prefix.trim().is_empty() {
            return Err(CubeError::Config("cube prefix must not be empty".into()));
        }

        let timeout_secs = cli
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(CubeError::Config("timeout must be at least one second".into()));
        }

        let log_dir = cli
            .log_dir
            .or(file.log_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let log_dir = if log_dir.is_absolute() {
            log_dir
        } else {
            project_path.join(log_dir)
        };

        Ok(Self {
            index_url: cli
                .index_url
                .or(file.index_url)
                .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()),
            log_dir,
            cube_prefix,
            timeout: Duration::from_secs(timeout_secs),
            vcs: cli.vcs.or(file.vcs).unwrap_or_default(),
            verbose: cli.verbose,
        })
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            base_url: self.index_url.clone(),
            timeout: self.timeout,
            verbose: self.verbose,
        }
    }
}

/// Configuration handed to the release index client.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub verbose: bool,
}

/// Configuration handed to the upgrade orchestrator for one run.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    pub test_command: String,
    /// Directory receiving this session's log files.
    pub session_log_dir: PathBuf,
    pub verbose: bool,
}

impl UpgradeConfig {
    pub fn new(settings: &Settings, test_command: &str, session: &str) -> Self {
        Self {
            test_command: test_command.to_string(),
            session_log_dir: settings.log_dir.join(session),
            verbose: settings.verbose,
        }
    }

    /// Log file for one trial, e.g. `upgrade_cubicweb_from_>=3.24_to_3.26.log`.
    pub fn log_path(&self, dependency: &str, before: &str, after: &str) -> PathBuf {
        let name = format!("upgrade_{dependency}_from_{before}_to_{after}.log");
        let name: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        self.session_log_dir.join(name)
    }
}
