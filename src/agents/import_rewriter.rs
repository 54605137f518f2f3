use crate::error::{CubeError, Result};
use crate::repository::ReleaseInfo;
use crate::utils::path_validator::PathValidator;
use colored::Colorize;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Adapts the working tree to a release of a cube dependency.
pub trait LayoutMigrator {
    /// `cube` is the cube's short name (`blog` for `cubicweb-blog`).
    fn migrate(&self, cube: &str, release: &ReleaseInfo) -> Result<()>;
}

/// Rewrites `from cubes.<name>` imports once a cube ships as `cubicweb_<name>`.
pub struct CubeImportRewriter {
    client: Client,
    python_files: Vec<PathBuf>,
}

impl CubeImportRewriter {
    /// `tracked_files` are relative to `project_root`; non-Python files are dropped.
    pub fn new(project_root: &Path, tracked_files: &[PathBuf], timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CubeError::ImportRewrite(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            python_files: python_sources(project_root, tracked_files),
        })
    }

    fn fetch_layout(&self, cube: &str, url: &str) -> Result<bool> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| CubeError::ImportRewrite(format!("Failed to download {url}: {e}")))?;

        uses_package_layout(response, cube)
    }
}

impl LayoutMigrator for CubeImportRewriter {
    fn migrate(&self, cube: &str, release: &ReleaseInfo) -> Result<()> {
        let Some(url) = release.url.as_deref() else {
            println!(
                "{}",
                format!(
                    "⚠ No distribution file for {} {}, can't check if the cube layout changed",
                    cube, release.version
                )
                .yellow()
            );
            return Ok(());
        };

        // The filename is more reliable than the URL when the index provides it.
        let artifact = release
            .metadata
            .as_ref()
            .map_or(url, |file| file.filename.as_str());
        if !is_tarball(artifact) {
            println!(
                "{}",
                format!(
                    "⚠ {} {} is not distributed as a tarball, can't check its layout",
                    cube, release.version
                )
                .yellow()
            );
            return Ok(());
        }

        // Without the archive the layout is unknown; the test run decides.
        let new_layout = match self.fetch_layout(cube, url) {
            Ok(new_layout) => new_layout,
            Err(e) => {
                println!(
                    "{}",
                    format!(
                        "⚠ Can't inspect {} {}, imports left unchanged: {}",
                        cube, release.version, e
                    )
                    .yellow()
                );
                return Ok(());
            }
        };

        if !new_layout {
            println!("   (cube {} is still in old format)", cube);
            return Ok(());
        }

        for file in rewrite_imports(&self.python_files, cube)? {
            println!(
                "   * change import to new format for cube {} in {}",
                cube.cyan(),
                file.display()
            );
        }
        Ok(())
    }
}

pub fn package_name(cube: &str) -> String {
    format!("cubicweb_{}", cube.replace('-', "_"))
}

fn is_tarball(artifact: &str) -> bool {
    let path = artifact.split(['?', '#']).next().unwrap_or(artifact);
    path.ends_with(".tar.gz") || path.ends_with(".tgz")
}

/// True when the sdist has a `cubicweb_<cube>` package right under its root
/// directory (`cubicweb-blog-1.3.0/cubicweb_blog/...`).
pub fn uses_package_layout<R: Read>(archive: R, cube: &str) -> Result<bool> {
    let package = package_name(cube);
    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    let entries = archive
        .entries()
        .map_err(|e| CubeError::ImportRewrite(format!("Unreadable archive: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| CubeError::ImportRewrite(format!("Unreadable archive: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| CubeError::ImportRewrite(format!("Unreadable archive entry: {e}")))?;

        let second = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .nth(1);
        if second.is_some_and(|c| c.as_os_str() == package.as_str()) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Replace old-style imports of `cube` in `files`, returning the files changed.
pub fn rewrite_imports(files: &[PathBuf], cube: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("from cubes.{}", cube.replace('-', "_"));
    let replacement = format!("from {}", package_name(cube));
    let mut changed = Vec::new();

    for file in files {
        let Ok(content) = fs::read_to_string(file) else {
            continue;
        };

        if content.contains(&pattern) {
            fs::write(file, content.replace(&pattern, &replacement)).map_err(|e| {
                CubeError::ImportRewrite(format!("Failed to write '{}': {e}", file.display()))
            })?;
            changed.push(file.clone());
        }
    }

    Ok(changed)
}

/// `*.py` files plus extension-less scripts with a python shebang.
fn python_sources(project_root: &Path, tracked_files: &[PathBuf]) -> Vec<PathBuf> {
    tracked_files
        .iter()
        .filter_map(|file| PathValidator::file_in_project(file, project_root).ok())
        .filter(|file| file.is_file())
        .filter(|file| match file.extension() {
            Some(ext) => ext == "py",
            None => has_python_shebang(file),
        })
        .collect()
}

fn has_python_shebang(file: &Path) -> bool {
    let Ok(handle) = fs::File::open(file) else {
        return false;
    };

    let mut first_line = String::new();
    if BufReader::new(handle).read_line(&mut first_line).is_err() {
        return false;
    }
    first_line.starts_with("#!") && first_line.contains("python")
}
