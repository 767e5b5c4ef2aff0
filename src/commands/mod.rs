//! CLI command implementations.

pub mod clear;
pub mod config;
pub mod daemon;
pub mod ping;
pub mod start;
pub mod status;

use anyhow::Result;

use crate::error::BlockdError;
use crate::protocol::Response;

/// Print the daemon's response line; a failure response becomes an error so
/// the process exits non-zero.
pub(crate) fn report(result: Result<Response, BlockdError>) -> Result<()> {
    let response = result?;
    print!("{}", response.encode()?);

    match response {
        Response::Outcome(outcome) if !outcome.success => {
            anyhow::bail!(outcome.error.unwrap_or_else(|| "request failed".to_string()))
        }
        _ => Ok(()),
    }
}
