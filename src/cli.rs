//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// complink - Inspect versioned component sets before linking them
#[derive(Parser, Debug)]
#[command(name = "complink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the order in which components would be loaded
    Order(commands::order::OrderArgs),

    /// Report missing and mismatched dependencies
    Check(commands::check::CheckArgs),

    /// Display the component dependency tree
    Tree(commands::tree::TreeArgs),

    /// List symbols exported in more than one version
    Conflicts(commands::conflicts::ConflictsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // A second initialisation (e.g. in tests) is harmless.
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.log_level.as_str()),
        )
        .try_init();

        match self.command {
            Commands::Order(args) => commands::order::execute(args),
            Commands::Check(args) => commands::check::execute(args),
            Commands::Tree(args) => commands::tree::execute(args),
            Commands::Conflicts(args) => commands::conflicts::execute(args),
        }
    }
}
