use crate::error::{CubeError, Result};
use std::path::{Path, PathBuf};

/// Path checks applied before the tool touches a working tree.
pub struct PathValidator;

impl PathValidator {
    /// Canonicalises the project directory and refuses system locations.
    pub fn project_root(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            CubeError::ProjectValidation(format!("Invalid path '{}': {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(CubeError::ProjectValidation(format!(
                "Path '{}' is not a directory",
                canonical.display()
            )));
        }

        const FORBIDDEN: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

        if let Some(forbidden) = FORBIDDEN
            .iter()
            .find(|forbidden| canonical.starts_with(forbidden))
        {
            return Err(CubeError::ProjectValidation(format!(
                "Refusing to work inside system directory '{forbidden}'"
            )));
        }

        Ok(canonical)
    }

    /// Resolves `file` (relative paths are taken from `root`) and checks it
    /// stays inside `root`, which must already be canonical.
    pub fn file_in_project(file: impl AsRef<Path>, root: &Path) -> Result<PathBuf> {
        let file = file.as_ref();
        let joined = if file.is_absolute() {
            file.to_path_buf()
        } else {
            root.join(file)
        };

        let canonical = joined.canonicalize().map_err(|e| {
            CubeError::ProjectValidation(format!("Invalid file path '{}': {e}", joined.display()))
        })?;

        if !canonical.starts_with(root) {
            return Err(CubeError::ProjectValidation(format!(
                "'{}' is outside the project directory",
                canonical.display()
            )));
        }

        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn project_root_is_canonical_directory() {
        let dir = tempdir().unwrap();
        let root = PathValidator::project_root(dir.path()).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn project_root_rejects_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("setup.py");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            PathValidator::project_root(&file),
            Err(CubeError::ProjectValidation(_))
        ));
    }

    #[test]
    fn project_root_rejects_system_directory() {
        assert!(PathValidator::project_root("/proc").is_err());
    }

    #[test]
    fn relative_file_resolves_inside_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir(root.join("cubicweb_card")).unwrap();
        fs::write(root.join("cubicweb_card/views.py"), "").unwrap();

        let resolved = PathValidator::file_in_project("cubicweb_card/views.py", &root).unwrap();
        assert_eq!(resolved, root.join("cubicweb_card/views.py"));
    }

    #[test]
    fn traversal_outside_root_is_rejected() {
        let outer = tempdir().unwrap();
        let root = outer.path().join("cube");
        fs::create_dir(&root).unwrap();
        fs::write(outer.path().join("secret.py"), "").unwrap();
        let root = root.canonicalize().unwrap();

        assert!(PathValidator::file_in_project("../secret.py", &root).is_err());
    }
}
