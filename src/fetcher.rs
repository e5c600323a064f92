//! Artifact downloads.
//!
//! Every fetch is a full overwrite of the destination file; there is no
//! caching or version tracking at this layer. Transport failures are reported
//! once through `FetchOutcome` and the caller decides whether to proceed.

use crate::model::FetchOutcome;
use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

pub fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build http client")
}

/// Download `url` to `local_path`, overwriting any prior copy.
pub async fn fetch(client: &Client, url: &str, local_path: &Path) -> FetchOutcome {
    match try_fetch(client, url, local_path).await {
        Ok(()) => FetchOutcome::Done,
        Err(e) => FetchOutcome::Failed {
            file: local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| local_path.display().to_string()),
            error: format!("{e:#}"),
        },
    }
}

async fn try_fetch(client: &Client, url: &str, local_path: &Path) -> Result<()> {
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let resp = client
        .get(url)
        .send()
        .await
        .context("request failed")?
        .error_for_status()
        .context("server rejected the request")?;
    let body = resp.bytes().await.context("read response body")?;
    tokio::fs::write(local_path, &body)
        .await
        .with_context(|| format!("write {}", local_path.display()))?;
    Ok(())
}
