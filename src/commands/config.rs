//! Config command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Write the default configuration to `config_path`.
pub async fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    Config::default().save(config_path)?;
    println!("[OK] Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Print the effective configuration (defaults when the file is missing).
pub async fn show(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
