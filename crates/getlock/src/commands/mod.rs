//! Subcommand implementations.

pub mod probe;
pub mod run;
pub mod status;

use anyhow::{Context, Result};

use crate::{config::GetlockConfig, mysql::MySqlSession};

/// Open a dedicated MySQL session for one command.
async fn connect(config: &GetlockConfig) -> Result<MySqlSession> {
    let url = config.require_database_url()?;
    MySqlSession::connect(url, config.connect_timeout())
        .await
        .context("Failed to connect to MySQL")
}
