mod agents;
mod cli;
mod config;
mod error;
mod pypi;
mod repository;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use config::Overrides;
use std::process;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::UpgradeDependencies {
            test_command,
            index_url,
            log_dir,
            vcs,
            cube_prefix,
            timeout,
        } => {
            let overrides = Overrides {
                index_url,
                log_dir,
                cube_prefix,
                timeout_secs: timeout,
                vcs,
                verbose: cli.verbose,
            };
            workflow::execute_upgrade(&cli.path, &test_command, overrides)
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
