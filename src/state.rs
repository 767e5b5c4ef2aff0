//! Durable storage for the single active block.
//!
//! The document on disk is `{ "currentBlock": BlockState | null }` and is
//! rewritten wholesale on every mutation. When a firewall backend is in use,
//! the addresses its rules cover are kept beside the block under
//! `firewallAddrs` so the rules can be rebuilt after a reboot. Loading never fails: a missing,
//! unreadable or corrupt file is treated as "no block" so a damaged state
//! file can never keep the daemon from starting.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// The single active blocking policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    /// Domains as supplied by the caller.
    pub domains: Vec<String>,
    /// Expiry, in milliseconds since the Unix epoch.
    pub end_time: i64,
    /// Caller's own identifier, never interpreted.
    pub blocklist_id: String,
}

impl BlockState {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.end_time
    }

    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.end_time - now_ms).max(0)
    }
}

/// A block read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub block: BlockState,
    /// Addresses the firewall rules covered when the block was started
    pub firewall_addrs: Vec<IpAddr>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    #[serde(default)]
    current_block: Option<BlockState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    firewall_addrs: Vec<IpAddr>,
}

/// Loads and saves the state document at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted block, dropping it if it expired while the daemon
    /// was not running.
    pub fn load(&self, now_ms: i64) -> Option<Persisted> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read state file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let document: StateDocument = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                warn!("Ignoring corrupt state file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match document.current_block {
            Some(block) if block.is_expired(now_ms) => {
                info!(
                    "Persisted block '{}' expired while the daemon was down, dropping it",
                    block.blocklist_id
                );
                None
            }
            Some(block) => Some(Persisted {
                block,
                firewall_addrs: document.firewall_addrs,
            }),
            None => None,
        }
    }

    /// Persist `block` and its firewall addresses atomically (temp file in
    /// the same directory, then rename).
    pub fn save(&self, block: Option<&BlockState>, firewall_addrs: &[IpAddr]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory {}", parent.display()))?;

        let document = StateDocument {
            current_block: block.cloned(),
            firewall_addrs: match block {
                Some(_) => firewall_addrs.to_vec(),
                None => Vec::new(),
            },
        };
        let content =
            serde_json::to_string_pretty(&document).context("Failed to serialize state")?;

        let mut temp_file = NamedTempFile::new_in(parent)
            .context("Failed to create temporary file for state")?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.write_all(b"\n")?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .with_context(|| format!("Failed to persist state file {}", self.path.display()))?;

        debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
