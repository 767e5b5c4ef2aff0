//! Start command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::client::CommandClient;
use crate::config::Config;
use crate::protocol::StartBlock;
use crate::state::now_ms;

/// End time in ms: `until` wins, else now + `duration`.
fn end_time(duration: Option<Duration>, until: Option<i64>, now: i64) -> Result<i64> {
    match (duration, until) {
        (_, Some(until)) => Ok(until),
        (Some(duration), None) => {
            let millis = i64::try_from(duration.as_millis()).context("Duration is too long")?;
            now.checked_add(millis).context("Duration is too long")
        }
        (None, None) => anyhow::bail!("Either --duration or --until is required"),
    }
}

/// Run the start command
pub async fn run(
    config_path: &Path,
    domains: Vec<String>,
    duration: Option<Duration>,
    until: Option<i64>,
    blocklist_id: String,
) -> Result<()> {
    let config = Config::load(config_path)?;
    let end_time = end_time(duration, until, now_ms())?;

    let client = CommandClient::new(&config.socket_path);
    super::report(
        client
            .start_block(StartBlock {
                domains,
                end_time,
                blocklist_id,
            })
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_time_from_duration() {
        assert_eq!(
            end_time(Some(Duration::from_secs(60)), None, 1_000).unwrap(),
            61_000
        );
    }

    #[test]
    fn test_end_time_until_is_absolute() {
        assert_eq!(end_time(None, Some(5), 1_000).unwrap(), 5);
    }

    #[test]
    fn test_end_time_requires_one() {
        assert!(end_time(None, None, 0).is_err());
    }
}
