use crate::agents::version_control::VcsKind;
use crate::config::VcsChoice;
use crate::error::{CubeError, Result};
use crate::utils::path_validator::PathValidator;
use std::fs;
use std::path::{Path, PathBuf};

pub const PKGINFO_FILE_NAME: &str = "__pkginfo__.py";
const CUBE_PACKAGE_PREFIX: &str = "cubicweb_";

/// ProjectScannerAgent validates the cube layout
pub struct ProjectScannerAgent {
    project_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub project_path: PathBuf,
    pub pkginfo_path: PathBuf,
    pub vcs: VcsKind,
}

impl ProjectScannerAgent {
    pub fn new<P: AsRef<Path>>(project_path: P) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
        }
    }

    pub fn validate(&self, vcs: VcsChoice) -> Result<ProjectInfo> {
        let project_path = PathValidator::project_root(&self.project_path)?;
        let pkginfo_path = Self::find_pkginfo(&project_path)?;
        let vcs = Self::resolve_vcs(&project_path, vcs)?;

        Ok(ProjectInfo {
            project_path,
            pkginfo_path,
            vcs,
        })
    }

    /// `__pkginfo__.py` lives at the root of old-style cubes and inside the
    /// `cubicweb_<name>` package of new-style ones.
    pub fn find_pkginfo(project_path: &Path) -> Result<PathBuf> {
        let direct = project_path.join(PKGINFO_FILE_NAME);
        if direct.is_file() {
            return Ok(direct);
        }

        let mut packages: Vec<PathBuf> = fs::read_dir(project_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_dir()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(CUBE_PACKAGE_PREFIX))
            })
            .collect();
        packages.sort();

        packages
            .into_iter()
            .map(|package| package.join(PKGINFO_FILE_NAME))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                CubeError::MetadataNotFound(format!(
                    "no {} in '{}' or its {}* packages",
                    PKGINFO_FILE_NAME,
                    project_path.display(),
                    CUBE_PACKAGE_PREFIX
                ))
            })
    }

    fn resolve_vcs(project_path: &Path, choice: VcsChoice) -> Result<VcsKind> {
        match choice {
            VcsChoice::Git => Ok(VcsKind::Git),
            VcsChoice::Hg => Ok(VcsKind::Mercurial),
            VcsChoice::Auto => Self::detect_vcs(project_path).ok_or_else(|| {
                CubeError::ProjectValidation(format!(
                    "'{}' is not inside a Mercurial or Git repository",
                    project_path.display()
                ))
            }),
        }
    }

    /// Nearest enclosing repository wins; `.hg` is preferred over `.git`.
    pub fn detect_vcs(project_path: &Path) -> Option<VcsKind> {
        project_path.ancestors().find_map(|dir| {
            if dir.join(".hg").is_dir() {
                Some(VcsKind::Mercurial)
            } else if dir.join(".git").exists() {
                Some(VcsKind::Git)
            } else {
                None
            }
        })
    }
}
