use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) card_forge";

/// Blocking client for asset lookups. Every request carries `timeout`.
pub fn asset_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build asset http client")
}
