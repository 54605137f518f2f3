use crate::error::Result;

/// Distribution file metadata attached to a release, when the index has any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    pub filename: String,
    pub package_type: Option<String>,
    pub upload_time: Option<String>,
}

/// One published version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub url: Option<String>,
    pub metadata: Option<ReleaseFile>,
}

impl ReleaseInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            url: None,
            metadata: None,
        }
    }
}

/// Result of looking a package up on a release index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseLookup {
    Found(Vec<ReleaseInfo>),
    NotFound,
}

pub trait ReleaseIndexClient {
    /// Fetch every known release of `package`.
    fn fetch_releases(&self, package: &str) -> Result<ReleaseLookup>;
}
