pub mod constraint;
pub mod index;
pub mod version;

pub use constraint::VersionConstraint;
pub use index::PypiIndex;
pub use version::LooseVersion;
