//! Status command implementation.

use anyhow::Result;
use std::path::Path;

use crate::client::CommandClient;
use crate::config::Config;

/// Run the status command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let client = CommandClient::new(&config.socket_path);
    super::report(client.get_status().await)
}
