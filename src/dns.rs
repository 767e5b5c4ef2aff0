//! DNS helpers: forward resolution for IP-based firewall rules and the
//! platform DNS cache flush.

use anyhow::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cmd_abstraction::{self, CommandExecutor};

/// Default DNS resolution timeout in seconds
pub const DNS_TIMEOUT_SECS: u64 = 5;

/// Forward resolver used before the hosts file is rewritten.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to its addresses. Failures yield an empty list.
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// System resolver (getaddrinfo) with a per-lookup timeout.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(DNS_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        let name = host.to_string();
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_host(&name));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(addrs))) => addrs,
            Ok(Ok(Err(e))) => {
                debug!("DNS lookup for {} failed: {}", host, e);
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("DNS lookup task for {} failed: {}", host, e);
                Vec::new()
            }
            Err(_) => {
                warn!("DNS lookup for {} timed out after {:?}", host, self.timeout);
                Vec::new()
            }
        }
    }
}

/// Addresses that a hosts redirect (or a local stub) produces; blocking them
/// at the firewall would be meaningless or harmful.
fn is_blockable(addr: &IpAddr) -> bool {
    !(addr.is_unspecified() || addr.is_loopback())
}

/// Resolve one host, keeping only addresses worth a firewall rule.
pub async fn resolve_blockable(resolver: &dyn Resolver, host: &str) -> Vec<IpAddr> {
    resolver
        .resolve(host)
        .await
        .into_iter()
        .filter(is_blockable)
        .collect()
}

type FlushCommand = (&'static str, &'static [&'static str]);

/// Commands that flush the OS resolver cache, tried in order. On Linux the
/// first one that runs successfully wins; on macOS all of them run.
#[cfg(target_os = "macos")]
const FLUSH_COMMANDS: &[FlushCommand] = &[
    ("dscacheutil", &["-flushcache"]),
    ("killall", &["-HUP", "mDNSResponder"]),
];

#[cfg(target_os = "windows")]
const FLUSH_COMMANDS: &[FlushCommand] = &[("ipconfig", &["/flushdns"])];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const FLUSH_COMMANDS: &[FlushCommand] = &[
    ("resolvectl", &["flush-caches"]),
    ("systemd-resolve", &["--flush-caches"]),
];

/// Flush the OS DNS cache so blocked names stop resolving from cache.
///
/// Best effort: returns an error only if no flush command succeeded.
pub async fn flush_dns_cache(executor: &Arc<dyn CommandExecutor>) -> Result<()> {
    let run_all = cfg!(target_os = "macos");
    let mut flushed = false;
    let mut last_error = None;

    for (program, args) in FLUSH_COMMANDS {
        match cmd_abstraction::run(executor, program, args, None).await {
            Ok(_) => {
                debug!("Flushed DNS cache with {}", program);
                flushed = true;
                if !run_all {
                    break;
                }
            }
            Err(e) => last_error = Some(e),
        }
    }

    match (flushed, last_error) {
        (true, _) => Ok(()),
        (false, Some(e)) => Err(e.context("Failed to flush DNS cache")),
        (false, None) => Ok(()),
    }
}
