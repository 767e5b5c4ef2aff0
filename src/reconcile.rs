//! Reconciliation loop.
//!
//! Ticks at a fixed interval while a block is active, expiring it on time and
//! rebuilding the hosts section if something removed or edited it. While no
//! block is active the timer is stopped and the loop waits on the engine's
//! enforcing flag.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::engine::{BlockEngine, Tick};
use crate::signal::ShutdownToken;

/// Run until `shutdown` is cancelled.
pub async fn run(engine: Arc<BlockEngine>, interval: Duration, shutdown: ShutdownToken) {
    let mut enforcing = engine.subscribe();

    loop {
        while !*enforcing.borrow_and_update() {
            debug!("Reconciliation idle");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                changed = enforcing.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        debug!("Reconciliation started, every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let tick = engine.reconcile().await;
                    if !tick.is_enforcing() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::MockCommandExecutor;
    use crate::dns::mock::StaticResolver;
    use crate::engine::EngineParts;
    use crate::enforcer::NoopBackend;
    use crate::hosts::HostsFile;
    use crate::protocol::StartBlock;
    use crate::state::{now_ms, StateStore};
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<BlockEngine> {
        BlockEngine::spawn(EngineParts {
            store: StateStore::new(dir.path().join("state.json")),
            hosts: HostsFile::new(dir.path().join("hosts")),
            backend: Arc::new(NoopBackend),
            resolver: Arc::new(StaticResolver::default()),
            executor: Arc::new(MockCommandExecutor::new()),
            flush_dns: false,
        })
    }

    #[tokio::test]
    async fn test_loop_expires_block() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(run(
            engine.clone(),
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        engine
            .start_block(StartBlock {
                domains: vec!["x.com".to_string()],
                end_time: now_ms() + 150,
                blocklist_id: "short".to_string(),
            })
            .await
            .unwrap();
        assert!(std::fs::read_to_string(dir.path().join("hosts"))
            .unwrap()
            .contains("0.0.0.0 x.com"));

        let mut flag = engine.subscribe();
        tokio::time::timeout(Duration::from_secs(5), flag.wait_for(|on| !*on))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("hosts")).unwrap(), "");
        assert!(!engine.status().await.active);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_repairs_hosts_file() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(run(
            engine.clone(),
            Duration::from_millis(20),
            shutdown.clone(),
        ));

        engine
            .start_block(StartBlock {
                domains: vec!["x.com".to_string()],
                end_time: now_ms() + 60_000,
                blocklist_id: "long".to_string(),
            })
            .await
            .unwrap();

        let hosts = dir.path().join("hosts");
        std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();

        let repaired = async {
            loop {
                if std::fs::read_to_string(&hosts).unwrap().contains("0.0.0.0 x.com") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), repaired)
            .await
            .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_stops_while_idle() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(run(engine, Duration::from_millis(20), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
