use super::DependencyDeclaration;
use super::state::{Action, Event, State, Verdict, transition};
use super::summary::{SummaryEntry, UpgradeSummary};
use crate::agents::import_rewriter::LayoutMigrator;
use crate::agents::pkginfo_editor::DependencyStore;
use crate::agents::test_runner::{TestOutcome, TestRunner};
use crate::agents::version_control::VersionControl;
use crate::config::UpgradeConfig;
use crate::error::{CubeError, Result};
use crate::repository::ReleaseInfo;
use colored::Colorize;
use std::path::PathBuf;

/// A dependency together with the releases worth trying
#[derive(Debug, Clone)]
pub struct UpgradeTarget {
    pub declaration: DependencyDeclaration,
    /// Ascending, all newer than what the constraint allows today.
    pub candidates: Vec<ReleaseInfo>,
}

impl UpgradeTarget {
    fn version(&self, index: usize) -> &str {
        &self.candidates[index].version
    }

    fn versions_from(&self, index: usize) -> Vec<String> {
        self.candidates[index..]
            .iter()
            .map(|c| c.version.clone())
            .collect()
    }
}

/// A run stopped by an error on `dependency`, with what was done before it.
#[derive(Debug)]
pub struct Interrupted {
    pub dependency: String,
    pub summary: UpgradeSummary,
    pub error: CubeError,
}

/// UpgradeOrchestrator drives each dependency through the transition table
pub struct UpgradeOrchestrator<'a> {
    config: &'a UpgradeConfig,
    store: &'a dyn DependencyStore,
    runner: &'a dyn TestRunner,
    vcs: &'a dyn VersionControl,
    migrator: &'a dyn LayoutMigrator,
}

impl<'a> UpgradeOrchestrator<'a> {
    pub fn new(
        config: &'a UpgradeConfig,
        store: &'a dyn DependencyStore,
        runner: &'a dyn TestRunner,
        vcs: &'a dyn VersionControl,
        migrator: &'a dyn LayoutMigrator,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            vcs,
            migrator,
        }
    }

    /// Upgrade every target, cubes first since their import fixes can affect
    /// the tests of everything after them.
    ///
    /// On error the current dependency is reverted and the summary of the
    /// dependencies already handled comes back with the error.
    pub fn run(
        &self,
        mut targets: Vec<UpgradeTarget>,
    ) -> std::result::Result<UpgradeSummary, Interrupted> {
        targets.sort_by_key(|target| !target.declaration.is_cube());

        let mut summary = UpgradeSummary::new();
        for target in targets.iter().filter(|t| !t.candidates.is_empty()) {
            if let Err(error) = self.upgrade(target, &mut summary) {
                if let Err(revert_err) = self.vcs.revert_all() {
                    eprintln!(
                        "{} {}",
                        "Failed to revert the working tree:".red().bold(),
                        revert_err
                    );
                }
                return Err(Interrupted {
                    dependency: target.declaration.name.clone(),
                    summary,
                    error,
                });
            }
        }

        Ok(summary)
    }

    fn upgrade(&self, target: &UpgradeTarget, summary: &mut UpgradeSummary) -> Result<()> {
        let count = target.candidates.len();
        let name = &target.declaration.name;
        let initial = &target.declaration.constraint;

        println!(
            "\n{} {} to {}",
            "Upgrading".cyan().bold(),
            name.white().bold(),
            target.version(count - 1).green()
        );

        let mut state = State::NotStarted;
        let mut event = Event::Start;
        let mut last_log: Option<PathBuf> = None;

        loop {
            let step = transition(state, event, count);
            let walking = matches!(step.next, State::Sequential { .. });
            let mut outcome = None;

            for action in step.actions {
                match action {
                    Action::Try(index) => {
                        if walking {
                            println!("\ntrying {} to {}", name, target.version(index));
                        }
                        self.apply(target, index)?;
                        let (passed, log) = self.test(target, index)?;
                        last_log = Some(log);
                        outcome = Some(if passed { Event::Passed } else { Event::Failed });
                    }
                    Action::Restore(index) => self.apply(target, index)?,
                    Action::Revert => self.vcs.revert_all()?,
                    Action::Commit(index) => {
                        let message = commit_message(name, initial, target.version(index));
                        println!("{} {}", "Committing:".dimmed(), message);
                        summary.commits.push(self.vcs.commit(&message)?);
                    }
                }
            }

            let previous = state;
            state = step.next;

            if let State::Terminal(verdict) = state {
                let log_file = last_log.unwrap_or_default();
                self.record(target, verdict, log_file, summary);
                return Ok(());
            }

            announce(target, previous, state, outcome);
            event = outcome.ok_or_else(|| {
                CubeError::TestExecution(format!("no test scheduled for {name} in {state:?}"))
            })?;
        }
    }

    fn apply(&self, target: &UpgradeTarget, index: usize) -> Result<()> {
        let declaration = &target.declaration;
        let release = &target.candidates[index];

        self.store.pin(&declaration.name, &release.version)?;
        if let Some(cube) = declaration.cube.as_deref() {
            self.migrator.migrate(cube, release)?;
        }
        Ok(())
    }

    fn test(&self, target: &UpgradeTarget, index: usize) -> Result<(bool, PathBuf)> {
        let log = self.config.log_path(
            &target.declaration.name,
            &target.declaration.constraint,
            target.version(index),
        );

        println!("starting test process '{}'...", self.config.test_command);
        println!("logging command output in {}", log.display());

        let outcome = self.runner.run(&self.config.test_command, &log)?;
        match outcome {
            TestOutcome::Passed => println!("{}", "✓ Tests passed".green()),
            TestOutcome::Failed(Some(code)) => {
                println!("{}", format!("✗ Tests failed (exit code {code})").red())
            }
            TestOutcome::Failed(None) => {
                println!("{}", "✗ Tests failed (killed by a signal)".red())
            }
        }
        Ok((outcome.passed(), log))
    }

    fn record(
        &self,
        target: &UpgradeTarget,
        verdict: Verdict,
        log_file: PathBuf,
        summary: &mut UpgradeSummary,
    ) {
        let name = &target.declaration.name;
        let count = target.candidates.len();
        let entry = |to: Option<usize>, remaining: Vec<String>| SummaryEntry {
            dependency: name.clone(),
            from: target.declaration.constraint.clone(),
            to: to.map(|index| target.version(index).to_string()),
            log_file: log_file.clone(),
            remaining,
        };

        match verdict {
            Verdict::FullSuccess { reached } => {
                println!(
                    "{}",
                    format!("✓ Success for upgrading {} to {}!", name, target.version(reached))
                        .green()
                );
                summary.full_success.push(entry(Some(reached), Vec::new()));
            }
            Verdict::PartialSuccess {
                reached,
                stopped_at,
            } => {
                match stopped_at {
                    Some(failed) => println!(
                        "{}",
                        format!(
                            "Failure when upgrading {} to {}, {} is the maximum upgradable version",
                            name,
                            target.version(failed),
                            target.version(reached)
                        )
                        .yellow()
                    ),
                    None => println!(
                        "{}",
                        format!(
                            "{} is the last working version before the failing {}",
                            target.version(reached),
                            target.version(count - 1)
                        )
                        .yellow()
                    ),
                }
                let remaining = target.versions_from(stopped_at.unwrap_or(count - 1));
                summary.partial_success.push(entry(Some(reached), remaining));
            }
            Verdict::TotalFailure => {
                println!(
                    "{}",
                    format!("✗ Failure when upgrading {} to any version, reverted", name).red()
                );
                summary.total_failure.push(entry(None, target.versions_from(0)));
            }
        }
    }
}

fn announce(target: &UpgradeTarget, previous: State, next: State, outcome: Option<Event>) {
    let name = &target.declaration.name;
    match (previous, next, outcome) {
        (State::TryingMax, State::Sequential { .. }, _) => println!(
            "{}",
            format!(
                "Failure when upgrading {} to {}, switching to version per version strategy",
                name,
                target.version(target.candidates.len() - 1)
            )
            .yellow()
        ),
        (State::Sequential { index, .. }, State::Sequential { .. }, _) => println!(
            "{}",
            format!(
                "Success on {} for version {}! Continue to next version",
                name,
                target.version(index)
            )
            .green()
        ),
        _ => {}
    }
}

pub fn commit_message(dependency: &str, from: &str, to: &str) -> String {
    format!("upgrade {dependency} from '{from}' to '== {to}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::upgrade::Outcome;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::path::Path;

    type Tree = BTreeMap<String, String>;

    /// In-memory working tree standing in for the file, the VCS, the test
    /// command and the import rewriter at once.
    struct FakeWorkspace {
        committed: RefCell<Tree>,
        working: RefCell<Tree>,
        commits: RefCell<Vec<String>>,
        tested: RefCell<Vec<String>>,
        logs: RefCell<Vec<PathBuf>>,
        reverts: Cell<usize>,
        passes: Box<dyn Fn(&Tree) -> bool>,
        fail_pin: Option<&'static str>,
        fail_migrate: Option<&'static str>,
    }

    impl FakeWorkspace {
        fn new(initial: &[(&str, &str)], passes: impl Fn(&Tree) -> bool + 'static) -> Self {
            let tree: Tree = initial
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Self {
                committed: RefCell::new(tree.clone()),
                working: RefCell::new(tree),
                commits: RefCell::new(Vec::new()),
                tested: RefCell::new(Vec::new()),
                logs: RefCell::new(Vec::new()),
                reverts: Cell::new(0),
                passes: Box::new(passes),
                fail_pin: None,
                fail_migrate: None,
            }
        }

        fn committed(&self, key: &str) -> String {
            self.committed.borrow().get(key).cloned().unwrap_or_default()
        }
    }

    impl DependencyStore for FakeWorkspace {
        fn pin(&self, dependency: &str, version: &str) -> Result<()> {
            if self.fail_pin == Some(version) {
                return Err(CubeError::Parse("disk full".into()));
            }
            self.working
                .borrow_mut()
                .insert(dependency.to_string(), format!("== {version}"));
            Ok(())
        }
    }

    impl TestRunner for FakeWorkspace {
        fn run(&self, _command: &str, log_path: &Path) -> Result<TestOutcome> {
            let working = self.working.borrow();
            self.tested
                .borrow_mut()
                .push(working.values().cloned().collect::<Vec<_>>().join(";"));
            self.logs.borrow_mut().push(log_path.to_path_buf());
            if (self.passes)(&working) {
                Ok(TestOutcome::Passed)
            } else {
                Ok(TestOutcome::Failed(Some(1)))
            }
        }
    }

    impl VersionControl for FakeWorkspace {
        fn is_clean(&self) -> Result<bool> {
            Ok(*self.working.borrow() == *self.committed.borrow())
        }

        fn revert_all(&self) -> Result<()> {
            self.reverts.set(self.reverts.get() + 1);
            *self.working.borrow_mut() = self.committed.borrow().clone();
            Ok(())
        }

        fn commit(&self, message: &str) -> Result<String> {
            *self.committed.borrow_mut() = self.working.borrow().clone();
            self.commits.borrow_mut().push(message.to_string());
            Ok(message.to_string())
        }

        fn tracked_files(&self) -> Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    impl LayoutMigrator for FakeWorkspace {
        fn migrate(&self, cube: &str, release: &ReleaseInfo) -> Result<()> {
            if self.fail_migrate == Some(cube) {
                return Err(CubeError::ImportRewrite("Failed to download archive".into()));
            }
            self.working
                .borrow_mut()
                .insert(format!("imports:{cube}"), release.version.clone());
            Ok(())
        }
    }

    fn config() -> UpgradeConfig {
        UpgradeConfig {
            test_command: "pytest".to_string(),
            session_log_dir: PathBuf::from("/logs/session"),
            verbose: false,
        }
    }

    fn target(name: &str, constraint: &str, candidates: &[&str]) -> UpgradeTarget {
        UpgradeTarget {
            declaration: DependencyDeclaration::new(name, constraint, "cubicweb-"),
            candidates: candidates.iter().map(|v| ReleaseInfo::new(*v)).collect(),
        }
    }

    fn pinned(tree: &Tree, key: &str) -> String {
        tree.get(key).cloned().unwrap_or_default()
    }

    fn run(
        workspace: &FakeWorkspace,
        targets: Vec<UpgradeTarget>,
    ) -> std::result::Result<UpgradeSummary, Interrupted> {
        let config = config();
        UpgradeOrchestrator::new(&config, workspace, workspace, workspace, workspace).run(targets)
    }

    #[test]
    fn scenario_full_success() {
        let workspace = FakeWorkspace::new(&[("six", "==1.0")], |_| true);

        let summary = run(&workspace, vec![target("six", "==1.0", &["1.1", "1.2"])]).unwrap();

        assert_eq!(summary.full_success.len(), 1);
        assert_eq!(summary.full_success[0].to.as_deref(), Some("1.2"));
        assert_eq!(summary.commits, vec!["upgrade six from '==1.0' to '== 1.2'"]);
        assert_eq!(workspace.committed("six"), "== 1.2");
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn scenario_partial_success_after_exhausting_walk() {
        let workspace =
            FakeWorkspace::new(&[("six", "==1.0")], |tree| pinned(tree, "six") == "== 1.1");

        let summary = run(&workspace, vec![target("six", "==1.0", &["1.1", "1.2"])]).unwrap();

        assert_eq!(summary.partial_success.len(), 1);
        let entry = &summary.partial_success[0];
        assert_eq!(entry.to.as_deref(), Some("1.1"));
        assert_eq!(entry.remaining, vec!["1.2"]);
        assert_eq!(
            entry.log_file,
            PathBuf::from("/logs/session/upgrade_six_from_==1.0_to_1.1.log")
        );
        assert_eq!(summary.commits, vec!["upgrade six from '==1.0' to '== 1.1'"]);
        assert_eq!(workspace.committed("six"), "== 1.1");
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn scenario_total_failure_reverts() {
        let workspace = FakeWorkspace::new(&[("six", "==1.0")], |_| false);

        let summary = run(&workspace, vec![target("six", "==1.0", &["1.1"])]).unwrap();

        assert_eq!(summary.total_failure.len(), 1);
        assert_eq!(summary.total_failure[0].to, None);
        assert_eq!(summary.total_failure[0].remaining, vec!["1.1"]);
        assert_eq!(
            summary.total_failure[0].log_file,
            PathBuf::from("/logs/session/upgrade_six_from_==1.0_to_1.1.log")
        );
        assert!(summary.commits.is_empty());
        assert!(workspace.commits.borrow().is_empty());
        assert_eq!(workspace.committed("six"), "==1.0");
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn walk_failure_rolls_back_to_last_passing_version() {
        // 1.1 and 1.2 pass, 1.3 breaks, 1.4 (the newest) breaks too.
        let workspace = FakeWorkspace::new(&[("six", ">= 1.0")], |tree| {
            matches!(pinned(tree, "six").as_str(), "== 1.1" | "== 1.2")
        });

        let summary = run(
            &workspace,
            vec![target("six", ">= 1.0", &["1.1", "1.2", "1.3", "1.4"])],
        )
        .unwrap();

        let entry = &summary.partial_success[0];
        assert_eq!(entry.to.as_deref(), Some("1.2"));
        assert_eq!(entry.remaining, vec!["1.3", "1.4"]);
        // The failing run explains where the walk stopped.
        assert_eq!(
            entry.log_file,
            PathBuf::from("/logs/session/upgrade_six_from_>=1.0_to_1.3.log")
        );
        assert_eq!(summary.commits, vec!["upgrade six from '>= 1.0' to '== 1.2'"]);
        assert_eq!(workspace.committed("six"), "== 1.2");
        assert_eq!(
            *workspace.tested.borrow(),
            vec!["== 1.4", "== 1.1", "== 1.2", "== 1.3"]
        );
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn first_walk_candidate_failing_is_total_failure() {
        let workspace = FakeWorkspace::new(&[("six", "==1.0")], |_| false);

        let summary = run(&workspace, vec![target("six", "==1.0", &["1.1", "1.2", "1.3"])]).unwrap();

        assert_eq!(summary.total_failure[0].remaining, vec!["1.1", "1.2", "1.3"]);
        assert_eq!(
            summary.total_failure[0].log_file,
            PathBuf::from("/logs/session/upgrade_six_from_==1.0_to_1.1.log")
        );
        assert_eq!(workspace.tested.borrow().len(), 2);
        assert_eq!(workspace.reverts.get(), 2);
        assert!(workspace.commits.borrow().is_empty());
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn cubes_are_processed_first_and_migrated() {
        let workspace = FakeWorkspace::new(
            &[("cubicweb-blog", "== 1.0"), ("six", "== 1.0")],
            |_| true,
        );

        let summary = run(
            &workspace,
            vec![
                target("six", "== 1.0", &["1.1"]),
                target("cubicweb-blog", "== 1.0", &["1.3"]),
            ],
        )
        .unwrap();

        assert_eq!(
            summary.commits,
            vec![
                "upgrade cubicweb-blog from '== 1.0' to '== 1.3'",
                "upgrade six from '== 1.0' to '== 1.1'"
            ]
        );
        assert_eq!(workspace.committed("imports:blog"), "1.3");
        assert_eq!(workspace.committed("imports:six"), "");
    }

    #[test]
    fn rollback_reapplies_migration_of_kept_version() {
        let workspace = FakeWorkspace::new(&[("cubicweb-blog", "== 1.0")], |tree| {
            pinned(tree, "cubicweb-blog") == "== 1.1"
        });

        run(
            &workspace,
            vec![target("cubicweb-blog", "== 1.0", &["1.1", "1.2", "1.3"])],
        )
        .unwrap();

        assert_eq!(workspace.committed("cubicweb-blog"), "== 1.1");
        assert_eq!(workspace.committed("imports:blog"), "1.1");
    }

    #[test]
    fn every_attempted_dependency_lands_in_one_bucket() {
        let workspace = FakeWorkspace::new(
            &[("a", "==1"), ("b", "==1"), ("c", "==1")],
            |tree| pinned(tree, "a") != "== 3" && pinned(tree, "c") == "==1",
        );

        let summary = run(
            &workspace,
            vec![
                target("a", "==1", &["2", "3"]),
                target("b", "==1", &["2"]),
                target("c", "==1", &["2"]),
            ],
        )
        .unwrap();

        assert_eq!(summary.total_attempted(), 3);
        assert_eq!(summary.outcome_of("a"), Some(Outcome::PartialSuccess));
        assert_eq!(summary.outcome_of("b"), Some(Outcome::FullSuccess));
        assert_eq!(summary.outcome_of("c"), Some(Outcome::TotalFailure));
    }

    #[test]
    fn nothing_to_try_changes_nothing() {
        let workspace = FakeWorkspace::new(&[("six", "==1.0")], |_| true);

        let summary = run(&workspace, vec![target("six", "==1.0", &[])]).unwrap();

        assert_eq!(summary.total_attempted(), 0);
        assert!(workspace.commits.borrow().is_empty());
        assert!(workspace.tested.borrow().is_empty());
        assert_eq!(workspace.reverts.get(), 0);
    }

    #[test]
    fn log_files_are_named_from_dependency_and_versions() {
        let workspace = FakeWorkspace::new(&[("six", ">= 1.0")], |_| true);

        let summary = run(&workspace, vec![target("six", ">= 1.0", &["1.2"])]).unwrap();

        let expected = PathBuf::from("/logs/session/upgrade_six_from_>=1.0_to_1.2.log");
        assert_eq!(summary.full_success[0].log_file, expected);
        assert_eq!(*workspace.logs.borrow(), vec![expected]);
    }

    #[test]
    fn collaborator_error_reverts_and_propagates() {
        let mut workspace = FakeWorkspace::new(&[("six", "==1.0")], |_| false);
        workspace.fail_pin = Some("1.1");

        let interrupted = run(&workspace, vec![target("six", "==1.0", &["1.1", "1.2"])]).unwrap_err();

        assert!(matches!(interrupted.error, CubeError::Parse(_)));
        assert_eq!(interrupted.dependency, "six");
        assert_eq!(interrupted.summary.total_attempted(), 0);
        assert!(workspace.is_clean().unwrap());
        assert!(workspace.commits.borrow().is_empty());
    }

    #[test]
    fn error_on_later_dependency_keeps_earlier_results() {
        let mut workspace = FakeWorkspace::new(
            &[("cubicweb-a", "==1"), ("cubicweb-b", "==1")],
            |_| true,
        );
        workspace.fail_migrate = Some("b");

        let interrupted = run(
            &workspace,
            vec![
                target("cubicweb-a", "==1", &["2"]),
                target("cubicweb-b", "==1", &["2"]),
            ],
        )
        .unwrap_err();

        assert!(matches!(interrupted.error, CubeError::ImportRewrite(_)));
        assert_eq!(interrupted.dependency, "cubicweb-b");
        assert_eq!(
            interrupted.summary.commits,
            vec!["upgrade cubicweb-a from '==1' to '== 2'"]
        );
        assert_eq!(
            interrupted.summary.outcome_of("cubicweb-a"),
            Some(Outcome::FullSuccess)
        );
        assert_eq!(interrupted.summary.outcome_of("cubicweb-b"), None);
        assert_eq!(workspace.committed("cubicweb-b"), "==1");
        assert!(workspace.is_clean().unwrap());
    }

    #[test]
    fn commit_message_format() {
        assert_eq!(
            commit_message("cubicweb", ">= 3.24.0", "3.26.2"),
            "upgrade cubicweb from '>= 3.24.0' to '== 3.26.2'"
        );
    }
}
