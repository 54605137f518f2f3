use crate::pypi::{LooseVersion, VersionConstraint};
use crate::repository::ReleaseInfo;

/// Outcome of comparing a constraint with the published releases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Releases newer than everything the constraint allows, ascending.
    Candidates {
        maximum_version: String,
        candidates: Vec<ReleaseInfo>,
    },
    /// The constraint already allows the newest release.
    UpToDate { maximum_version: String },
    /// No published release satisfies the constraint.
    NoCompatibleRelease,
}

pub struct UpgradeCandidateSelector;

impl UpgradeCandidateSelector {
    pub fn select(constraint: &VersionConstraint, releases: &[ReleaseInfo]) -> Selection {
        let Some(maximum) = releases
            .iter()
            .filter(|release| constraint.is_satisfied_by(&release.version))
            .map(|release| LooseVersion::parse(&release.version))
            .max()
        else {
            return Selection::NoCompatibleRelease;
        };

        let mut sorted: Vec<(LooseVersion, &ReleaseInfo)> = releases
            .iter()
            .map(|release| (LooseVersion::parse(&release.version), release))
            .filter(|(version, _)| *version > maximum)
            .collect();
        // `1.1` and `1.1.0` are the same version; ties go to the smaller
        // spelling so the pick does not depend on the index's ordering.
        sorted.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.version.cmp(&b.1.version))
        });
        sorted.dedup_by(|later, earlier| later.0 == earlier.0);

        let maximum_version = maximum.original;
        if sorted.is_empty() {
            return Selection::UpToDate { maximum_version };
        }

        Selection::Candidates {
            maximum_version,
            candidates: sorted.into_iter().map(|(_, release)| release.clone()).collect(),
        }
    }
}
