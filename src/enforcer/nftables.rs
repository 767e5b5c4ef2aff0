//! nftables backend implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use super::{BlockTargets, FirewallBackend};
use crate::cmd_abstraction::{self, CommandExecutor};

const TABLE_NAME: &str = "blockd";
const SET_NAME_V4: &str = "blocked_v4";
const SET_NAME_V6: &str = "blocked_v6";

/// nftables backend
///
/// Owns a single `inet blockd` table; nothing outside it is touched.
pub struct NftablesBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl NftablesBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Generate the nftables script for `targets`.
    ///
    /// "add table" + "flush table" makes the script idempotent whether or not
    /// the table already exists, and nft applies the file atomically.
    fn generate_apply_script(targets: &BlockTargets) -> String {
        let mut script = String::new();

        script.push_str(&format!("add table inet {}\n", TABLE_NAME));
        script.push_str(&format!("flush table inet {}\n", TABLE_NAME));

        script.push_str(&format!("table inet {} {{\n", TABLE_NAME));
        script.push_str(&set_definition(SET_NAME_V4, "ipv4_addr", targets.v4()));
        script.push_str(&set_definition(SET_NAME_V6, "ipv6_addr", targets.v6()));

        for (chain, hook) in [("output", "output"), ("forward", "forward")] {
            script.push_str(&format!(
                "    chain {} {{\n        type filter hook {} priority 0; policy accept;\n",
                chain, hook
            ));
            script.push_str(&format!("        ip daddr @{} counter reject\n", SET_NAME_V4));
            script.push_str(&format!("        ip6 daddr @{} counter reject\n", SET_NAME_V6));
            script.push_str("    }\n");
        }

        script.push_str("}\n");
        script
    }

    /// "add" before "delete" so removal succeeds when the table is absent
    fn generate_remove_script() -> String {
        format!("add table inet {0}\ndelete table inet {0}\n", TABLE_NAME)
    }

    async fn exec_nft_script(&self, script: String) -> Result<()> {
        debug!("Applying nftables script:\n{}", script);
        cmd_abstraction::run(&self.executor, "nft", &["-f", "-"], Some(script))
            .await
            .context("Failed to apply nftables rules")?;
        Ok(())
    }
}

fn set_definition<'a>(
    name: &str,
    kind: &str,
    addrs: impl Iterator<Item = &'a IpAddr>,
) -> String {
    let elements: Vec<String> = addrs.map(|a| a.to_string()).collect();

    let mut set = format!("    set {} {{\n        type {}\n", name, kind);
    if !elements.is_empty() {
        set.push_str(&format!("        elements = {{ {} }}\n", elements.join(", ")));
    }
    set.push_str("    }\n");
    set
}

#[async_trait]
impl FirewallBackend for NftablesBackend {
    fn name(&self) -> &'static str {
        "nftables"
    }

    async fn apply(&self, targets: &BlockTargets) -> Result<()> {
        self.exec_nft_script(Self::generate_apply_script(targets))
            .await?;
        info!(
            "nftables: blocking {} addresses for {} hosts",
            targets.addrs.len(),
            targets.hosts.len()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.exec_nft_script(Self::generate_remove_script()).await?;
        info!("nftables: rules removed");
        Ok(())
    }
}
