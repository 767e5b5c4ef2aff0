//! CLI argument parsing with clap.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::validation::parse_duration;

#[derive(Parser)]
#[command(name = "blockd")]
#[command(author, version, about = "Privileged website blocking daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon in the foreground
    Run {
        /// Skip the root check (for testing against temporary files)
        #[arg(long)]
        allow_unprivileged: bool,
    },

    /// Check that the daemon answers
    Ping,

    /// Show the active block
    Status,

    /// Start (or replace) a block
    #[command(group(ArgGroup::new("end").required(true).args(["duration", "until"])))]
    Start {
        /// Domain to block (repeatable)
        #[arg(short, long = "domain", required = true)]
        domains: Vec<String>,

        /// Block length from now (e.g. 25m, 2h, 1d)
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Absolute end time in milliseconds since the Unix epoch
        #[arg(long)]
        until: Option<i64>,

        /// Identifier reported back by `status`
        #[arg(long, default_value = "cli")]
        blocklist_id: String,
    },

    /// Clear the active block
    Clear,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a config file with the default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
