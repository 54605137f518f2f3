use crate::config::IndexConfig;
use crate::error::{CubeError, Result};
use crate::repository::{ReleaseFile, ReleaseIndexClient, ReleaseInfo, ReleaseLookup};
use colored::Colorize;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use url::Url;

const USER_AGENT: &str = concat!("cubetoolkit/", env!("CARGO_PKG_VERSION"));
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Client for the PyPI JSON API (`{base}/{package}/json`)
pub struct PypiIndex {
    client: Client,
    base_url: String,
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(default)]
    releases: HashMap<String, Vec<DistributionFile>>,
}

#[derive(Debug, Deserialize)]
struct DistributionFile {
    filename: String,
    url: Option<String>,
    packagetype: Option<String>,
    upload_time_iso_8601: Option<String>,
}

impl PypiIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Self::validate_index_url(&config.base_url)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CubeError::ReleaseIndex(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            verbose: config.verbose,
        })
    }

    fn package_url(&self, package: &str) -> String {
        format!("{}/{}/json", self.base_url, package)
    }

    fn validate_index_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|_| CubeError::Config(format!("Invalid release index URL: {url}")))?;

        match parsed.scheme() {
            "https" | "http" => Ok(()),
            scheme => Err(CubeError::Config(format!(
                "Unsupported release index scheme: {scheme}"
            ))),
        }
    }

    fn parse_document(text: &str) -> Result<Vec<ReleaseInfo>> {
        let document: PackageDocument = serde_json::from_str(text)?;

        let releases = document
            .releases
            .into_iter()
            .map(|(version, files)| release_from_files(version, files))
            .collect();

        Ok(releases)
    }
}

/// Metadata for a release comes from its sdist when there is one, since the
/// source archive is what import-layout detection inspects.
fn release_from_files(version: String, files: Vec<DistributionFile>) -> ReleaseInfo {
    let position = files
        .iter()
        .position(|f| f.packagetype.as_deref() == Some("sdist"))
        .unwrap_or(0);

    match files.into_iter().nth(position) {
        Some(file) => ReleaseInfo {
            version,
            url: file.url,
            metadata: Some(ReleaseFile {
                filename: file.filename,
                package_type: file.packagetype,
                upload_time: file.upload_time_iso_8601,
            }),
        },
        None => ReleaseInfo::new(version),
    }
}

fn too_large(package: &str) -> CubeError {
    CubeError::ReleaseIndex(format!("Response for {package} exceeded 64MB limit"))
}

/// Read at most `limit` bytes of UTF-8; `None` when the body is longer.
fn read_limited<R: Read>(reader: R, limit: usize) -> std::io::Result<Option<String>> {
    let mut body = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut body)?;
    if body.len() > limit {
        return Ok(None);
    }
    String::from_utf8(body)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl ReleaseIndexClient for PypiIndex {
    fn fetch_releases(&self, package: &str) -> Result<ReleaseLookup> {
        let url = self.package_url(package);

        if self.verbose {
            eprintln!("{} Fetching: {}", "[VERBOSE]".dimmed(), url);
        }

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CubeError::ReleaseIndex(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(ReleaseLookup::NotFound);
        }

        if !status.is_success() {
            if self.verbose {
                eprintln!("{} HTTP {}: {}", "[VERBOSE]".dimmed(), status, url);
            }
            return Err(CubeError::ReleaseIndex(format!("HTTP {status} for {url}")));
        }

        if response
            .content_length()
            .is_some_and(|length| length > MAX_RESPONSE_BYTES as u64)
        {
            return Err(too_large(package));
        }

        // Chunked responses carry no length, so the body is capped while read.
        let text = read_limited(response, MAX_RESPONSE_BYTES)
            .map_err(|e| CubeError::ReleaseIndex(format!("Failed to read {url}: {e}")))?
            .ok_or_else(|| too_large(package))?;

        Ok(ReleaseLookup::Found(Self::parse_document(&text)?))
    }
}
