//! blockd - Privileged Website Blocking Daemon
//!
//! Runs the blocking daemon (`blockd run`) and talks to it from the command line.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blockd::cli::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr so client commands keep stdout for JSON
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { allow_unprivileged } => {
            blockd::commands::daemon::run(&cli.config, allow_unprivileged).await
        }
        Commands::Ping => blockd::commands::ping::run(&cli.config).await,
        Commands::Status => blockd::commands::status::run(&cli.config).await,
        Commands::Start {
            domains,
            duration,
            until,
            blocklist_id,
        } => {
            blockd::commands::start::run(&cli.config, domains, duration, until, blocklist_id).await
        }
        Commands::Clear => blockd::commands::clear::run(&cli.config).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => blockd::commands::config::init(&cli.config, force).await,
            ConfigAction::Show => blockd::commands::config::show(&cli.config).await,
        },
        Commands::Version => {
            println!("blockd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
