use std::path::PathBuf;

/// One dependency's outcome in the end-of-run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub dependency: String,
    /// Constraint text before the run.
    pub from: String,
    /// Version committed, `None` for total failures.
    pub to: Option<String>,
    /// Log of the last test run for this dependency.
    pub log_file: PathBuf,
    /// Newer candidates left untried or failing.
    pub remaining: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    FullSuccess,
    PartialSuccess,
    TotalFailure,
}

impl Outcome {
    pub fn title(&self) -> &'static str {
        match self {
            Self::FullSuccess => "Full successes",
            Self::PartialSuccess => "Partial successes",
            Self::TotalFailure => "Total failures",
        }
    }
}

/// Tracks the outcome of every attempted dependency
#[derive(Debug, Clone, Default)]
pub struct UpgradeSummary {
    pub full_success: Vec<SummaryEntry>,
    pub partial_success: Vec<SummaryEntry>,
    pub total_failure: Vec<SummaryEntry>,
    pub commits: Vec<String>,
}

impl UpgradeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dependencies that ended in any bucket
    pub fn total_attempted(&self) -> usize {
        self.full_success.len() + self.partial_success.len() + self.total_failure.len()
    }

    /// Buckets in report order
    pub fn sections(&self) -> [(Outcome, &[SummaryEntry]); 3] {
        [
            (Outcome::FullSuccess, self.full_success.as_slice()),
            (Outcome::PartialSuccess, self.partial_success.as_slice()),
            (Outcome::TotalFailure, self.total_failure.as_slice()),
        ]
    }

    /// Bucket holding `dependency`, if any
    #[cfg(test)]
    pub fn outcome_of(&self, dependency: &str) -> Option<Outcome> {
        self.sections()
            .into_iter()
            .find(|(_, entries)| entries.iter().any(|e| e.dependency == dependency))
            .map(|(outcome, _)| outcome)
    }
}
