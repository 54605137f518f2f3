use thiserror::Error;

#[derive(Error, Debug)]
pub enum CubeError {
    #[error("Project validation failed: {0}")]
    ProjectValidation(String),

    #[error("Working tree is not clean: {0}")]
    DirtyWorkingTree(String),

    #[error("Package metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("Dependency declarations could not be parsed: {0}")]
    Parse(String),

    #[error("Invalid version constraint: {0}")]
    Constraint(String),

    #[error("Release index request failed: {0}")]
    ReleaseIndex(String),

    #[error("Version control operation failed: {0}")]
    VersionControl(String),

    #[error("Test command failed to execute: {0}")]
    TestExecution(String),

    #[error("Import rewrite failed: {0}")]
    ImportRewrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CubeError>;
