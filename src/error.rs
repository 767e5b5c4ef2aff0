//! Error types for blockd.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum BlockdError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("At least one domain is required")]
    NoDomains,

    #[error("End time must be in the future")]
    EndTimeInPast,

    #[error("Failed to read hosts file {}: {source}", path.display())]
    HostsRead { path: PathBuf, source: io::Error },

    #[error("Failed to write hosts file {}: {source}", path.display())]
    HostsWrite { path: PathBuf, source: io::Error },

    #[error("daemon not running or unresponsive")]
    DaemonUnavailable,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BlockdError {
    /// True for failures caused by the request itself rather than the host.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidDomain(_) | Self::NoDomains | Self::EndTimeInPast | Self::Protocol(_)
        )
    }
}
