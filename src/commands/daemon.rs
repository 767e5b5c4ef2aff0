//! Daemon command implementation.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cmd_abstraction::{CommandExecutor, RealCommandExecutor};
use crate::config::Config;
use crate::dns::SystemResolver;
use crate::enforcer::{check_root, create_backend};
use crate::engine::{BlockEngine, EngineParts};
use crate::hosts::HostsFile;
use crate::reconcile;
use crate::server;
use crate::signal::{ShutdownGuard, ShutdownToken};
use crate::state::StateStore;

/// Run the daemon until SIGINT/SIGTERM.
///
/// Hosts entries and firewall rules are left in place on shutdown; the
/// persisted state lets the next start pick the block up again.
pub async fn run(config_path: &Path, allow_unprivileged: bool) -> Result<()> {
    if allow_unprivileged {
        warn!("Skipping root check (--allow-unprivileged)");
    } else {
        check_root()?;
    }

    let config = Config::load(config_path)?;
    info!("Starting blockd {}", env!("CARGO_PKG_VERSION"));

    let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor::new());
    let backend = create_backend(config.firewall, Arc::clone(&executor)).await;
    info!("Firewall backend: {}", backend.name());

    let engine = BlockEngine::spawn(EngineParts {
        store: StateStore::new(&config.state_file),
        hosts: HostsFile::new(&config.hosts_file),
        backend,
        resolver: Arc::new(SystemResolver::new(config.dns_timeout())),
        executor,
        flush_dns: config.flush_dns,
    });

    // Rewrite the section of a restored block, or drop a stray one
    engine.reconcile().await;

    let shutdown = ShutdownToken::new();
    let _guard = ShutdownGuard::new(shutdown.clone());

    let reconciler = tokio::spawn(reconcile::run(
        Arc::clone(&engine),
        config.tick_interval(),
        shutdown.clone(),
    ));

    let served = server::serve(
        engine,
        &config.socket_path,
        config.socket_mode,
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    if let Err(e) = reconciler.await {
        warn!("Reconciliation task failed: {}", e);
    }

    served?;
    info!("blockd stopped");
    Ok(())
}
