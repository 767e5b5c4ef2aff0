//! # blockd - Privileged Website Blocking Daemon
//!
//! A small root daemon that blocks websites for a bounded time window on
//! behalf of an unprivileged desktop app. It rewrites a marker-delimited
//! section of the system hosts file, optionally adds IP-level firewall rules,
//! keeps the block alive against tampering and lifts it when it expires.
//!
//! ## Features
//!
//! - **Hosts Redirection** - Each domain and its `www.` variant resolve to `0.0.0.0` / `::`
//! - **Non-Intrusive** - Only the managed section is ever touched; the rest of the file is preserved
//! - **Self-Healing** - Removed or edited sections are rebuilt on the next tick
//! - **Firewall Layer** - nftables, pf or Windows Firewall rules for the resolved addresses
//! - **Crash-Safe** - Block state persisted atomically and restored at startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blockd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: run, ping, status, start, clear, config    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Server (Unix socket / named pipe, JSON lines)              │
//! │    └── ping, start-block, clear-block, get-status           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BlockEngine (single mutation gate)                         │
//! │    ├── HostsFile (marker-bounded section)                   │
//! │    ├── StateStore (atomic JSON persistence)                 │
//! │    └── Effects worker (firewall jobs, DNS cache flush)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciliation loop (expiry, repair)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallBackend trait)                           │
//! │    ├── NftablesBackend (Linux)                              │
//! │    ├── PfBackend (macOS)                                    │
//! │    ├── NetshBackend (Windows)                               │
//! │    └── NoopBackend                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blockd::client::CommandClient;
//! use blockd::protocol::StartBlock;
//! use blockd::state::now_ms;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CommandClient::new("/var/run/blockd.sock");
//!
//!     let response = client
//!         .start_block(StartBlock {
//!             domains: vec!["example.com".to_string()],
//!             end_time: now_ms() + 25 * 60 * 1000,
//!             blocklist_id: "focus".to_string(),
//!         })
//!         .await?;
//!     assert!(response.is_success());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - **Input Validation** - Domains must be plain DNS names; nothing else reaches the hosts file
//! - **Atomic Operations** - State and config files written atomically to prevent corruption
//! - **No Authentication** - The socket is world-writable by default (`socket_mode`); any
//!   local user can start or clear a block
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`client`] - Protocol client used by the CLI
//! - [`cmd_abstraction`] - Subprocess execution behind a mockable trait
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`dns`] - Forward resolution and DNS cache flush
//! - [`enforcer`] - Firewall backend abstraction (nftables, pf, netsh)
//! - [`engine`] - Block state, mutation gate and effects worker
//! - [`error`] - Typed errors
//! - [`fs_abstraction`] - Filesystem access behind a mockable trait
//! - [`hosts`] - Managed hosts file section
//! - [`protocol`] - Wire messages
//! - [`reconcile`] - Periodic expiry and repair
//! - [`server`] - Socket / named pipe command server
//! - [`signal`] - Graceful shutdown signal handling
//! - [`state`] - Block state and persistence
//! - [`validation`] - Domain and duration validation

pub mod cli;
pub mod client;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod dns;
pub mod enforcer;
pub mod engine;
pub mod error;
pub mod fs_abstraction;
pub mod hosts;
pub mod protocol;
pub mod reconcile;
pub mod server;
pub mod signal;
pub mod state;
pub mod validation;

pub use cli::{Cli, Commands, ConfigAction};
pub use config::Config;
pub use error::BlockdError;
