//! Windows Firewall backend driven through `netsh advfirewall`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{BlockTargets, FirewallBackend};
use crate::cmd_abstraction::{self, CommandExecutor};

const RULE_NAME: &str = "blockd-block";

/// netsh rejects very long `remoteip=` lists, so large blocks are split over
/// several rules sharing one name.
const MAX_ADDRS_PER_RULE: usize = 200;

pub struct NetshBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl NetshBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn add_rule_args(remote_ips: &str) -> Vec<String> {
        vec![
            "advfirewall".to_string(),
            "firewall".to_string(),
            "add".to_string(),
            "rule".to_string(),
            format!("name={}", RULE_NAME),
            "dir=out".to_string(),
            "action=block".to_string(),
            "enable=yes".to_string(),
            format!("remoteip={}", remote_ips),
        ]
    }

    /// Delete every rule named `blockd-block`. netsh exits non-zero with
    /// "No rules match" when there is none.
    async fn delete_rules(&self) -> Result<()> {
        let name = format!("name={}", RULE_NAME);
        let output = cmd_abstraction::run_output(
            &self.executor,
            "netsh",
            &["advfirewall", "firewall", "delete", "rule", &name],
            None,
        )
        .await?;

        if output.success || output.stdout.contains("No rules match") {
            Ok(())
        } else {
            anyhow::bail!(
                "netsh failed: {}",
                first_non_empty(&output.stdout, &output.stderr)
            )
        }
    }
}

fn first_non_empty<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a.trim().is_empty() {
        b.trim()
    } else {
        a.trim()
    }
}

#[async_trait]
impl FirewallBackend for NetshBackend {
    fn name(&self) -> &'static str {
        "netsh"
    }

    async fn apply(&self, targets: &BlockTargets) -> Result<()> {
        self.delete_rules()
            .await
            .context("Failed to remove previous firewall rules")?;

        let addrs: Vec<String> = targets.addrs.iter().map(|a| a.to_string()).collect();
        for chunk in addrs.chunks(MAX_ADDRS_PER_RULE) {
            let args = Self::add_rule_args(&chunk.join(","));
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            debug!("Adding firewall rule for {} addresses", chunk.len());
            cmd_abstraction::run(&self.executor, "netsh", &args, None)
                .await
                .context("Failed to add firewall rule")?;
        }

        info!(
            "netsh: blocking {} addresses for {} hosts",
            addrs.len(),
            targets.hosts.len()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.delete_rules()
            .await
            .context("Failed to remove firewall rules")?;
        info!("netsh: rules removed");
        Ok(())
    }
}
