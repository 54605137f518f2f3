pub mod import_rewriter;
pub mod pkginfo_editor;
pub mod project_scanner;
pub mod test_runner;
pub mod version_control;

// Per-dependency upgrade loop
pub mod upgrade;
pub use upgrade::{UpgradeOrchestrator, UpgradeSummary, UpgradeTarget};

pub use import_rewriter::CubeImportRewriter;
pub use pkginfo_editor::PkgInfoEditor;
pub use project_scanner::ProjectScannerAgent;
pub use test_runner::ShellTestRunner;
pub use version_control::VersionControlAgent;
