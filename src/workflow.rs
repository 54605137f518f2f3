use crate::agents::import_rewriter::LayoutMigrator;
use crate::agents::test_runner::TestRunner;
use crate::agents::upgrade::{
    DependencyDeclaration, Outcome, Selection, SummaryEntry, UpgradeCandidateSelector,
};
use crate::agents::version_control::VersionControl;
use crate::agents::{
    CubeImportRewriter, PkgInfoEditor, ProjectScannerAgent, ShellTestRunner, UpgradeOrchestrator,
    UpgradeSummary, UpgradeTarget, VersionControlAgent,
};
use crate::config::{Overrides, Settings, UpgradeConfig};
use crate::error::{CubeError, Result};
use crate::pypi::{PypiIndex, VersionConstraint};
use crate::repository::{ReleaseIndexClient, ReleaseLookup};
use crate::utils::path_validator::PathValidator;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;

const SESSION_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Everything one upgrade run talks to
pub struct UpgradeSession<'a> {
    pub config: &'a UpgradeConfig,
    pub cube_prefix: &'a str,
    pub editor: &'a PkgInfoEditor,
    pub index: &'a dyn ReleaseIndexClient,
    pub vcs: &'a dyn VersionControl,
    pub runner: &'a dyn TestRunner,
    pub migrator: &'a dyn LayoutMigrator,
}

/// Execute the upgrade workflow
pub fn execute_upgrade<P: AsRef<Path>>(
    project_path: P,
    test_command: &str,
    overrides: Overrides,
) -> Result<()> {
    println!(
        "{}",
        "Starting automatic dependency upgrade...".cyan().bold()
    );
    warn_about_tox(test_command);

    // Step 1: Validate project structure
    println!("\n{}", "1. Validating project structure...".yellow());
    let project_root = PathValidator::project_root(project_path.as_ref())?;
    let settings = Settings::load(&project_root, overrides)?;
    let scanner = ProjectScannerAgent::new(&project_root);
    let project = scanner.validate(settings.vcs)?;
    println!("{}", "✓ Project structure is valid".green());
    println!(
        "   Found {} ({} repository)",
        project.pkginfo_path.display().to_string().bright_cyan(),
        project.vcs
    );

    let session = jiff::Zoned::now().strftime(SESSION_FORMAT).to_string();
    let config = UpgradeConfig::new(&settings, test_command, &session);

    let vcs = VersionControlAgent::new(project.vcs, &project.project_path, settings.verbose)?;
    let index = PypiIndex::new(&settings.index_config())?;
    let editor = PkgInfoEditor::new(&project.pkginfo_path);
    let runner = ShellTestRunner::new(&project.project_path, settings.verbose);
    let rewriter = CubeImportRewriter::new(
        &project.project_path,
        &vcs.tracked_files()?,
        settings.timeout,
    )?;

    let summary = upgrade_project(&UpgradeSession {
        config: &config,
        cube_prefix: &settings.cube_prefix,
        editor: &editor,
        index: &index,
        vcs: &vcs,
        runner: &runner,
        migrator: &rewriter,
    })?;

    match summary {
        Some(summary) => {
            print_upgrade_report(&summary, &config.session_log_dir);
            println!(
                "\n{}",
                "✨ Upgrade process completed successfully!".green().bold()
            );
        }
        None => println!(
            "\n{}",
            "✨ Nothing to do, everything is up to date".green().bold()
        ),
    }

    Ok(())
}

/// Steps 2 to 5 of the workflow. `None` means no dependency had anything to try.
pub fn upgrade_project(session: &UpgradeSession<'_>) -> Result<Option<UpgradeSummary>> {
    // Step 2: Nothing may be touched unless the tree is clean
    println!("\n{}", "2. Checking working tree status...".yellow());
    if !session.vcs.is_clean()? {
        return Err(CubeError::DirtyWorkingTree(
            "the working tree has uncommitted changes, commit or revert them first".into(),
        ));
    }
    println!("{}", "✓ Working tree is clean".green());

    // Step 3: Read dependency declarations
    println!("\n{}", "3. Reading dependencies...".yellow());
    let document = session.editor.read()?;
    let declarations: Vec<DependencyDeclaration> = document
        .entries()
        .iter()
        .map(|entry| {
            DependencyDeclaration::new(&entry.name, entry.constraint_text(), session.cube_prefix)
        })
        .collect();
    println!("   Found {} dependencies", declarations.len());
    print_cubes(&declarations);

    // Step 4: Find candidate releases
    println!("\n{}", "4. Looking for new releases...".yellow());
    let targets = plan_upgrades(&declarations, session.index, session.config.verbose)?;
    if targets.is_empty() {
        return Ok(None);
    }

    // Step 5: Try candidates against the test command
    println!("\n{}", "5. Upgrading dependencies...".yellow());
    let orchestrator = UpgradeOrchestrator::new(
        session.config,
        session.editor,
        session.runner,
        session.vcs,
        session.migrator,
    );
    match orchestrator.run(targets) {
        Ok(summary) => Ok(Some(summary)),
        Err(interrupted) => {
            println!(
                "\n{}",
                format!(
                    "✗ Upgrade stopped on {}, its changes were reverted",
                    interrupted.dependency
                )
                .red()
                .bold()
            );
            print_upgrade_report(&interrupted.summary, &session.config.session_log_dir);
            Err(interrupted.error)
        }
    }
}

/// Look every constrained dependency up on the index and keep the ones with
/// newer releases. Declarations without a constraint are left out entirely.
pub fn plan_upgrades(
    declarations: &[DependencyDeclaration],
    index: &dyn ReleaseIndexClient,
    verbose: bool,
) -> Result<Vec<UpgradeTarget>> {
    let mut constrained = Vec::new();
    for declaration in declarations {
        match VersionConstraint::parse(&declaration.constraint) {
            Ok(Some(constraint)) => constrained.push((declaration, constraint)),
            Ok(None) => {
                if verbose {
                    eprintln!(
                        "{} {} has no version constraint, skipping",
                        "[VERBOSE]".dimmed(),
                        declaration.name
                    );
                }
            }
            Err(e) => println!(
                "   {}",
                format!("⚠ Skipping {}: {}", declaration.name, e).yellow()
            ),
        }
    }

    if constrained.is_empty() {
        return Ok(Vec::new());
    }

    let pb = ProgressBar::new(constrained.len() as u64);
    if verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40}] {pos}/{len} {msg}")
            .map_err(|e| CubeError::Config(format!("Invalid progress template: {e}")))?
            .progress_chars("=>-"),
    );

    let mut selections = Vec::with_capacity(constrained.len());
    for (declaration, constraint) in constrained {
        pb.set_message(format!("Checking {}", declaration.name));
        let lookup = index.fetch_releases(declaration.package_name())?;
        selections.push((declaration, select_from(lookup, &constraint)));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut up_to_date = Vec::new();
    let mut targets = Vec::new();
    for (declaration, selection) in selections {
        match selection {
            None => println!(
                "   {}",
                format!(
                    "⚠ {} was not found on the package index, skipping",
                    declaration.package_name()
                )
                .yellow()
            ),
            Some(Selection::NoCompatibleRelease) => println!(
                "   {}",
                format!(
                    "⚠ No release of {} matches '{}', skipping",
                    declaration.name, declaration.constraint
                )
                .yellow()
            ),
            Some(Selection::UpToDate { .. }) => up_to_date.push(declaration.name.as_str()),
            Some(Selection::Candidates {
                maximum_version,
                candidates,
            }) => {
                if verbose {
                    eprintln!(
                        "{} {} currently resolves to {}",
                        "[VERBOSE]".dimmed(),
                        declaration.name,
                        maximum_version
                    );
                    for release in &candidates {
                        if let Some(file) = &release.metadata {
                            eprintln!(
                                "{}   {} {} ({}, uploaded {})",
                                "[VERBOSE]".dimmed(),
                                release.version,
                                file.filename,
                                file.package_type.as_deref().unwrap_or("unknown"),
                                file.upload_time.as_deref().unwrap_or("unknown")
                            );
                        }
                    }
                }
                targets.push(UpgradeTarget {
                    declaration: declaration.clone(),
                    candidates,
                });
            }
        }
    }

    if !up_to_date.is_empty() {
        println!(
            "   {} {}",
            "No upgrade needed for:".dimmed(),
            up_to_date.join(", ")
        );
    }

    if !targets.is_empty() {
        println!("   {}", "Upgrades available:".cyan().bold());
        for target in &targets {
            let versions: Vec<&str> = target
                .candidates
                .iter()
                .map(|c| c.version.as_str())
                .collect();
            println!(
                "   • {} ({}) → {}",
                target.declaration.name.white().bold(),
                target.declaration.constraint.dimmed(),
                versions.join(", ").green()
            );
        }
    }

    Ok(targets)
}

/// `None` when the package does not exist on the index.
fn select_from(lookup: ReleaseLookup, constraint: &VersionConstraint) -> Option<Selection> {
    match lookup {
        ReleaseLookup::Found(releases) => {
            Some(UpgradeCandidateSelector::select(constraint, &releases))
        }
        ReleaseLookup::NotFound => None,
    }
}

fn warn_about_tox(test_command: &str) {
    let mut words = test_command.split_whitespace();
    if words.next() == Some("tox") && !words.any(|w| w == "--recreate" || w == "-r") {
        println!(
            "{}",
            "⚠ Warning: tox is used without --recreate, upgraded dependencies may not be installed in existing environments"
                .yellow()
        );
    }
}

fn print_cubes(declarations: &[DependencyDeclaration]) {
    let cubes: Vec<&str> = declarations
        .iter()
        .filter_map(|d| d.cube.as_deref())
        .collect();

    if cubes.is_empty() {
        println!("   This cube doesn't depend on other cubes");
    } else {
        println!("   Cubes found: {}", cubes.join(", ").bright_cyan());
    }
}

fn print_upgrade_report(summary: &UpgradeSummary, log_dir: &Path) {
    println!("\n{}", "📦 Upgrade Summary:".cyan().bold());
    println!(
        "{}",
        format!("Tried to upgrade {} dependencies", summary.total_attempted()).yellow()
    );

    for (outcome, entries) in summary.sections() {
        println!("\n{}:", outcome.title().cyan().bold());
        if entries.is_empty() {
            println!("  {}", "None.".dimmed());
        }
        for entry in entries {
            println!("  • {}", describe(outcome, entry));
            println!("    {} {}", "log:".dimmed(), entry.log_file.display());
        }
    }

    println!("\n{}:", "Commits".cyan().bold());
    if summary.commits.is_empty() {
        println!("  {}", "No commits.".dimmed());
    }
    for commit in &summary.commits {
        println!("  • {}", commit);
    }

    println!(
        "\n{} {}",
        "Logs of every test run are in".dimmed(),
        log_dir.display()
    );
}

fn describe(outcome: Outcome, entry: &SummaryEntry) -> String {
    let to = entry.to.as_deref().unwrap_or_default();
    match outcome {
        Outcome::FullSuccess => format!(
            "{} {} → {}",
            entry.dependency.white().bold(),
            entry.from.red(),
            to.green().bold()
        ),
        Outcome::PartialSuccess => format!(
            "{} {} → {} (still failing: {})",
            entry.dependency.white().bold(),
            entry.from.red(),
            to.yellow().bold(),
            entry.remaining.join(", ").dimmed()
        ),
        Outcome::TotalFailure => format!(
            "{} {} (tried: {})",
            entry.dependency.white().bold(),
            entry.from.dimmed(),
            entry.remaining.join(", ").red()
        ),
    }
}
