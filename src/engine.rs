//! Block engine: owns the single active block and serializes every mutation.
//!
//! The gate (`tokio::sync::Mutex<Option<BlockState>>`) is held across the
//! state change, the hosts file rewrite and the state persist, so
//! `start-block`, `clear-block` and reconciliation passes never interleave.
//! Firewall and DNS-cache work runs in a separate effects worker fed through
//! an ordered queue, keeping subprocesses out of the gate while still
//! applying rules in mutation order.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cmd_abstraction::CommandExecutor;
use crate::dns::{self, Resolver};
use crate::enforcer::{BlockTargets, FirewallBackend};
use crate::error::BlockdError;
use crate::hosts::{self, HostsFile};
use crate::protocol::{StartBlock, StatusReport};
use crate::state::{now_ms, BlockState, StateStore};
use crate::validation::validate_domains;

/// Work handed to the effects worker.
#[derive(Debug)]
pub enum FirewallJob {
    Apply(BlockTargets),
    Clear,
    /// Completes once every job queued before it has run
    Barrier(oneshot::Sender<()>),
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No active block
    Idle,
    /// Block active and the hosts section intact
    Enforcing,
    /// Block active; the hosts section was missing or altered and got rewritten
    Repaired,
    /// Block reached its end time and was torn down
    Expired,
}

impl Tick {
    pub fn is_enforcing(self) -> bool {
        matches!(self, Tick::Enforcing | Tick::Repaired)
    }
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub store: StateStore,
    pub hosts: HostsFile,
    pub backend: Arc<dyn FirewallBackend>,
    pub resolver: Arc<dyn Resolver>,
    pub executor: Arc<dyn CommandExecutor>,
    pub flush_dns: bool,
}

pub struct BlockEngine {
    gate: Mutex<Option<BlockState>>,
    store: StateStore,
    hosts: HostsFile,
    resolver: Arc<dyn Resolver>,
    needs_addresses: bool,
    /// Last non-empty answer per host, reused when the hosts redirect of an
    /// earlier block masks the real addresses
    resolved: std::sync::Mutex<HashMap<String, Vec<IpAddr>>>,
    effects: mpsc::UnboundedSender<FirewallJob>,
    enforcing: watch::Sender<bool>,
}

impl BlockEngine {
    /// Restore persisted state and start the effects worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(parts: EngineParts) -> Arc<Self> {
        let EngineParts {
            store,
            hosts,
            backend,
            resolver,
            executor,
            flush_dns,
        } = parts;

        let (restored, restored_addrs) = match store.load(now_ms()) {
            Some(persisted) => {
                let block = persisted.block;
                info!(
                    "Restored block '{}' for {} domains, {} ms remaining",
                    block.blocklist_id,
                    block.domains.len(),
                    block.remaining_ms(now_ms())
                );
                (Some(block), persisted.firewall_addrs)
            }
            None => {
                debug!("No block to restore");
                (None, Vec::new())
            }
        };
        let restored_targets = restored.as_ref().map(|block| BlockTargets {
            hosts: hosts::host_names(&block.domains),
            addrs: restored_addrs,
        });

        let (effects, jobs) = mpsc::unbounded_channel();
        let (enforcing, _) = watch::channel(restored.is_some());
        let needs_addresses = backend.needs_addresses();

        tokio::spawn(run_effects(jobs, backend, executor, flush_dns));

        let engine = Arc::new(Self {
            gate: Mutex::new(restored),
            store,
            hosts,
            resolver,
            needs_addresses,
            resolved: std::sync::Mutex::new(HashMap::new()),
            effects,
            enforcing,
        });

        // Firewall rules do not survive a reboot; rebuild them from the saved
        // addresses. Rules of a block that ended while the daemon was down
        // must not linger.
        match restored_targets {
            Some(targets) => engine.dispatch(FirewallJob::Apply(targets)),
            None => engine.dispatch(FirewallJob::Clear),
        }

        engine
    }

    /// Replace the active block with `request`.
    pub async fn start_block(&self, request: StartBlock) -> Result<(), BlockdError> {
        self.start_block_at(request, now_ms()).await
    }

    pub async fn start_block_at(&self, request: StartBlock, now: i64) -> Result<(), BlockdError> {
        // Normalization happens at apply time; the block keeps the domains as sent
        validate_domains(&request.domains)?;
        if request.end_time <= now {
            return Err(BlockdError::EndTimeInPast);
        }

        let block = BlockState::from(request);
        let host_names = hosts::host_names(&block.domains);

        // Resolve before touching the hosts file, outside the gate
        let addrs = if self.needs_addresses {
            self.resolve_targets(&host_names).await
        } else {
            Vec::new()
        };

        let mut current = self.gate.lock().await;
        self.hosts.apply(&block.domains)?;

        info!(
            "Block '{}' started: {} domains until {}",
            block.blocklist_id,
            block.domains.len(),
            block.end_time
        );
        self.persist(Some(&block), &addrs);
        *current = Some(block);

        self.dispatch(FirewallJob::Apply(BlockTargets {
            hosts: host_names,
            addrs,
        }));
        self.enforcing.send_replace(true);
        Ok(())
    }

    /// Tear down the active block. Returns `false` when there was none, in
    /// which case nothing is touched.
    pub async fn clear_block(&self) -> Result<bool, BlockdError> {
        let mut current = self.gate.lock().await;
        let Some(block) = current.as_ref() else {
            debug!("clear-block without an active block");
            return Ok(false);
        };

        info!("Clearing block '{}'", block.blocklist_id);
        self.teardown(&mut current)?;
        Ok(true)
    }

    pub async fn status(&self) -> StatusReport {
        self.status_at(now_ms()).await
    }

    pub async fn status_at(&self, now: i64) -> StatusReport {
        match self.gate.lock().await.as_ref() {
            Some(block) => StatusReport::active(block, now),
            None => StatusReport::inactive(),
        }
    }

    pub async fn reconcile(&self) -> Tick {
        self.reconcile_at(now_ms()).await
    }

    /// One reconciliation pass: expire, repair, or remove a stray section.
    pub async fn reconcile_at(&self, now: i64) -> Tick {
        let mut current = self.gate.lock().await;

        let Some(block) = current.clone() else {
            match self.hosts.clear() {
                Ok(true) => {
                    info!(
                        "Removed stray blockd section from {}",
                        self.hosts.path().display()
                    );
                    self.dispatch(FirewallJob::Clear);
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to check hosts file: {}", e),
            }
            return Tick::Idle;
        };

        if block.is_expired(now) {
            info!("Block '{}' expired", block.blocklist_id);
            return match self.teardown(&mut current) {
                Ok(()) => Tick::Expired,
                Err(e) => {
                    warn!("Failed to end expired block, retrying next tick: {}", e);
                    Tick::Enforcing
                }
            };
        }

        match self.hosts.is_enforced(&block.domains) {
            Ok(true) => Tick::Enforcing,
            Ok(false) => match self.hosts.apply(&block.domains) {
                Ok(_) => {
                    warn!(
                        "blockd section in {} was missing or altered, restored it",
                        self.hosts.path().display()
                    );
                    Tick::Repaired
                }
                Err(e) => {
                    warn!("Failed to restore hosts section: {}", e);
                    Tick::Enforcing
                }
            },
            Err(e) => {
                warn!("Failed to check hosts file: {}", e);
                Tick::Enforcing
            }
        }
    }

    /// Receiver of the enforcing flag: true while a block is active.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.enforcing.subscribe()
    }

    pub fn is_enforcing(&self) -> bool {
        *self.enforcing.borrow()
    }

    /// Wait until every firewall job queued so far has run.
    pub async fn flush_effects(&self) {
        let (done, wait) = oneshot::channel();
        self.dispatch(FirewallJob::Barrier(done));
        // The worker only stops once the engine is dropped
        let _ = wait.await;
    }

    /// Remove the hosts section and drop the block. On a hosts failure the
    /// block stays in place.
    fn teardown(&self, current: &mut Option<BlockState>) -> Result<(), BlockdError> {
        self.hosts.clear()?;
        *current = None;
        self.persist(None, &[]);
        self.dispatch(FirewallJob::Clear);
        self.enforcing.send_replace(false);
        Ok(())
    }

    fn persist(&self, block: Option<&BlockState>, firewall_addrs: &[IpAddr]) {
        if let Err(e) = self.store.save(block, firewall_addrs) {
            warn!("Failed to persist block state: {:#}", e);
        }
    }

    fn dispatch(&self, job: FirewallJob) {
        if self.effects.send(job).is_err() {
            warn!("Effects worker stopped, firewall job dropped");
        }
    }

    /// Lookups run concurrently so the whole pass is bounded by one timeout.
    async fn resolve_targets(&self, host_names: &[String]) -> Vec<IpAddr> {
        let mut lookups = JoinSet::new();
        for host in host_names {
            let resolver = Arc::clone(&self.resolver);
            let host = host.clone();
            lookups.spawn(async move {
                let answer = dns::resolve_blockable(resolver.as_ref(), &host).await;
                (host, answer)
            });
        }

        let mut addrs = Vec::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((host, answer)) => addrs.extend(self.remember(&host, answer)),
                Err(e) => warn!("DNS lookup task failed: {}", e),
            }
        }
        addrs.sort();
        addrs.dedup();
        addrs
    }

    fn remember(&self, host: &str, answer: Vec<IpAddr>) -> Vec<IpAddr> {
        let Ok(mut cache) = self.resolved.lock() else {
            return answer;
        };
        if answer.is_empty() {
            let cached = cache.get(host).cloned().unwrap_or_default();
            if !cached.is_empty() {
                debug!("Using previously resolved addresses for {}", host);
            }
            cached
        } else {
            cache.insert(host.to_string(), answer.clone());
            answer
        }
    }
}

async fn run_effects(
    mut jobs: mpsc::UnboundedReceiver<FirewallJob>,
    backend: Arc<dyn FirewallBackend>,
    executor: Arc<dyn CommandExecutor>,
    flush_dns: bool,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            FirewallJob::Apply(targets) => {
                let result = if backend.needs_addresses() && targets.addrs.is_empty() {
                    debug!("No addresses resolved, relying on the hosts file alone");
                    backend.clear().await
                } else {
                    backend.apply(&targets).await
                };
                if let Err(e) = result {
                    warn!("Firewall ({}) apply failed: {:#}", backend.name(), e);
                }
                flush_cache(&executor, flush_dns).await;
            }
            FirewallJob::Clear => {
                if let Err(e) = backend.clear().await {
                    warn!("Firewall ({}) clear failed: {:#}", backend.name(), e);
                }
                flush_cache(&executor, flush_dns).await;
            }
            FirewallJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Effects worker stopped");
}

async fn flush_cache(executor: &Arc<dyn CommandExecutor>, enabled: bool) {
    if !enabled {
        return;
    }
    if let Err(e) = dns::flush_dns_cache(executor).await {
        warn!("{:#}", e);
    }
}
