//! macOS packet filter backend.
//!
//! Rules live in a `blockd` anchor nested under `com.apple`, which the stock
//! `/etc/pf.conf` already evaluates, so the main ruleset is never edited.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{BlockTargets, FirewallBackend};
use crate::cmd_abstraction::{self, CommandExecutor};

const ANCHOR: &str = "com.apple/blockd";
const TABLE_NAME: &str = "blockd_blocked";

pub struct PfBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl PfBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn generate_anchor_rules(targets: &BlockTargets) -> String {
        let addrs: Vec<String> = targets.addrs.iter().map(|a| a.to_string()).collect();
        format!(
            "table <{table}> persist {{ {addrs} }}\nblock drop out quick to <{table}>\n",
            table = TABLE_NAME,
            addrs = addrs.join(", ")
        )
    }
}

#[async_trait]
impl FirewallBackend for PfBackend {
    fn name(&self) -> &'static str {
        "pf"
    }

    async fn apply(&self, targets: &BlockTargets) -> Result<()> {
        let rules = Self::generate_anchor_rules(targets);
        debug!("Loading pf anchor {}:\n{}", ANCHOR, rules);

        cmd_abstraction::run(&self.executor, "pfctl", &["-a", ANCHOR, "-f", "-"], Some(rules))
            .await
            .context("Failed to load pf anchor")?;

        // pfctl -E fails when pf is already enabled; that is fine
        if let Err(e) = cmd_abstraction::run(&self.executor, "pfctl", &["-E"], None).await {
            debug!("pfctl -E: {}", e);
        }

        info!(
            "pf: blocking {} addresses for {} hosts",
            targets.addrs.len(),
            targets.hosts.len()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        cmd_abstraction::run(&self.executor, "pfctl", &["-a", ANCHOR, "-F", "all"], None)
            .await
            .context("Failed to flush pf anchor")?;
        info!("pf: rules removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{failed_output, ok_output, MockCommandExecutor};

    fn targets() -> BlockTargets {
        BlockTargets {
            hosts: vec!["x.com".to_string()],
            addrs: vec![
                "93.184.216.34".parse().unwrap(),
                "2606:2800:220:1::1".parse().unwrap(),
            ],
        }
    }

    #[test]
    fn test_generate_anchor_rules() {
        assert_eq!(
            PfBackend::generate_anchor_rules(&targets()),
            "table <blockd_blocked> persist { 93.184.216.34, 2606:2800:220:1::1 }\n\
             block drop out quick to <blockd_blocked>\n"
        );
    }

    #[tokio::test]
    async fn test_apply_loads_anchor_and_enables_pf() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute_with_stdin()
            .withf(|cmd, args, stdin| {
                cmd == "pfctl"
                    && args.join(" ") == "-a com.apple/blockd -f -"
                    && stdin.contains("block drop out quick")
            })
            .times(1)
            .returning(|_, _, _| Ok(ok_output("")));
        mock.expect_execute()
            .withf(|cmd, args| cmd == "pfctl" && args == ["-E".to_string()])
            .times(1)
            .returning(|_, _| Ok(failed_output("pf already enabled")));

        let backend = PfBackend::new(Arc::new(mock));
        backend.apply(&targets()).await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_flushes_anchor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "pfctl" && args.join(" ") == "-a com.apple/blockd -F all")
            .times(1)
            .returning(|_, _| Ok(ok_output("")));

        let backend = PfBackend::new(Arc::new(mock));
        backend.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_load_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute_with_stdin()
            .returning(|_, _, _| Ok(failed_output("pfctl: Permission denied")));

        let backend = PfBackend::new(Arc::new(mock));
        assert!(backend.apply(&targets()).await.is_err());
    }
}
