// Upgrade module - test-gated dependency upgrades
//
// - selector: which releases are worth trying for one dependency
// - state: the transition table driving one dependency through its candidates
// - orchestrator: executes the table against the collaborators
// - summary: what happened, for the end-of-run report
pub mod orchestrator;
pub mod selector;
pub mod state;
pub mod summary;

pub use orchestrator::{UpgradeOrchestrator, UpgradeTarget};
pub use selector::{Selection, UpgradeCandidateSelector};
pub use summary::{Outcome, SummaryEntry, UpgradeSummary};

/// A dependency declared in `__depends__`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDeclaration {
    /// Key as written, extras included (`pyramid[testing]`).
    pub name: String,
    /// Raw constraint text, empty when unconstrained.
    pub constraint: String,
    /// Short cube name (`blog` for `cubicweb-blog`) for cube-type packages.
    pub cube: Option<String>,
}

impl DependencyDeclaration {
    pub fn new(name: &str, constraint: &str, cube_prefix: &str) -> Self {
        let cube = name
            .strip_prefix(cube_prefix)
            .filter(|short| !short.is_empty())
            .map(str::to_string);

        Self {
            name: name.to_string(),
            constraint: constraint.to_string(),
            cube,
        }
    }

    pub fn is_cube(&self) -> bool {
        self.cube.is_some()
    }

    /// Name to look up on the release index, without extras.
    pub fn package_name(&self) -> &str {
        self.name
            .split_once('[')
            .map_or(self.name.as_str(), |(package, _)| package)
            .trim()
    }
}
