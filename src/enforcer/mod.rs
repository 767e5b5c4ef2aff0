//! Firewall enforcement backends (nftables, pf, netsh).
//!
//! The hosts file is the primary blocking mechanism. A firewall backend adds
//! IP-level rejection for the addresses the blocked names resolved to before
//! the hosts redirect was installed, which catches clients that bypass the
//! system resolver.

mod netsh;
mod nftables;
mod pf;

use anyhow::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

pub use netsh::NetshBackend;
pub use nftables::NftablesBackend;
pub use pf::PfBackend;

use crate::cmd_abstraction::{self, CommandExecutor};
use crate::config::Backend;

/// What a backend is asked to block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTargets {
    /// Host names covered by the block (base domains and `www.` variants)
    pub hosts: Vec<String>,
    /// Addresses those names resolved to, sorted and deduplicated
    pub addrs: Vec<IpAddr>,
}

impl BlockTargets {
    pub fn v4(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter().filter(|a| a.is_ipv4())
    }

    pub fn v6(&self) -> impl Iterator<Item = &IpAddr> {
        self.addrs.iter().filter(|a| a.is_ipv6())
    }
}

/// Trait for firewall backends
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether `apply` needs resolved addresses. Callers skip DNS lookups
    /// entirely when this is false.
    fn needs_addresses(&self) -> bool {
        true
    }

    /// Replace any previously installed blockd rules with rules for `targets`
    async fn apply(&self, targets: &BlockTargets) -> Result<()>;

    /// Remove all blockd rules (leave other rules intact). Succeeds when
    /// nothing is installed.
    async fn clear(&self) -> Result<()>;
}

/// Backend that installs nothing; the hosts file alone enforces the block.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl FirewallBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn needs_addresses(&self) -> bool {
        false
    }

    async fn apply(&self, targets: &BlockTargets) -> Result<()> {
        debug!("No firewall backend, {} hosts left to the hosts file", targets.hosts.len());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
const PROBE: Option<(Backend, &str, &[&str])> = Some((Backend::Nftables, "nft", &["--version"]));
#[cfg(target_os = "macos")]
const PROBE: Option<(Backend, &str, &[&str])> = Some((Backend::Pf, "pfctl", &["-s", "info"]));
#[cfg(target_os = "windows")]
const PROBE: Option<(Backend, &str, &[&str])> =
    Some((Backend::Netsh, "netsh", &["advfirewall", "show", "currentprofile"]));
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const PROBE: Option<(Backend, &str, &[&str])> = None;

/// Detect the platform's firewall backend, falling back to `Backend::None`
/// when its tool is missing or unusable.
pub async fn detect_backend(executor: &Arc<dyn CommandExecutor>) -> Backend {
    let Some((backend, program, args)) = PROBE else {
        return Backend::None;
    };

    match cmd_abstraction::run(executor, program, args, None).await {
        Ok(_) => backend,
        Err(e) => {
            info!("{} unavailable ({}), firewall rules disabled", program, e);
            Backend::None
        }
    }
}

/// Create a firewall backend based on configuration
pub async fn create_backend(
    backend: Backend,
    executor: Arc<dyn CommandExecutor>,
) -> Arc<dyn FirewallBackend> {
    let actual_backend = match backend {
        Backend::Auto => detect_backend(&executor).await,
        other => other,
    };

    match actual_backend {
        Backend::Nftables => Arc::new(NftablesBackend::new(executor)),
        Backend::Pf => Arc::new(PfBackend::new(executor)),
        Backend::Netsh => Arc::new(NetshBackend::new(executor)),
        Backend::None | Backend::Auto => Arc::new(NoopBackend),
    }
}

/// Check if running as root (effective UID == 0)
///
/// Editing the hosts file and installing firewall rules both require it.
#[cfg(unix)]
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions and never fails.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "blockd must run as root to edit the hosts file and firewall. \
             Please run with sudo, or pass --allow-unprivileged for testing."
        )
    }
    Ok(())
}

/// Administrator rights are enforced by the OS when the hosts file is opened.
#[cfg(not(unix))]
pub fn check_root() -> Result<()> {
    Ok(())
}
