use crate::config::VcsChoice;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cubetoolkit",
    about = "Cube Toolkit - Automatically upgrade the dependencies of a CubicWeb cube",
    version,
    author
)]
pub struct Cli {
    /// Path to the project directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    pub path: String,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upgrade each dependency in __pkginfo__.py as far as the test command allows
    #[command(visible_alias = "autoupgradedependencies")]
    UpgradeDependencies {
        /// Shell command deciding whether an upgrade is accepted (e.g. "tox -e py3")
        #[arg(value_name = "TEST_COMMAND")]
        test_command: String,

        /// Base URL of the package index JSON API
        #[arg(long, value_name = "URL")]
        index_url: Option<String>,

        /// Directory receiving the per-session test logs
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Version control backend to use
        #[arg(long, value_name = "auto|git|hg")]
        vcs: Option<VcsChoice>,

        /// Distribution name prefix marking a dependency as a cube
        #[arg(long, value_name = "PREFIX")]
        cube_prefix: Option<String>,

        /// HTTP timeout in seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },
}
