use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{FootageSource, FootageVideo};
use crate::util::ensure_dir;
use crate::{logi, logw};

const SEARCH_URL: &str = "https://api.pexels.com/videos/search";

pub struct PexelsClient {
    client: Client,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<FootageVideo>,
}

impl PexelsClient {
    pub fn new(client: Client, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

pub(crate) fn parse_search_response(raw: &str) -> Result<Vec<FootageVideo>> {
    let parsed: SearchResponse =
        serde_json::from_str(raw).context("Failed to parse Pexels search JSON")?;
    Ok(parsed.videos)
}

#[async_trait]
impl FootageSource for PexelsClient {
    async fn search(
        &self,
        query: &str,
        orientation: &str,
        per_page: u32,
    ) -> Result<Vec<FootageVideo>> {
        logi(format!("Searching Pexels for: {}", query));
        let per_page = per_page.to_string();
        let resp = self
            .client
            .get(SEARCH_URL)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("orientation", orientation),
                ("per_page", per_page.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("Pexels search request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(400).collect::<String>();
            anyhow::bail!("Pexels API error HTTP {}: {}", status.as_u16(), snippet);
        }

        let videos = parse_search_response(&raw)?;
        if videos.is_empty() {
            logw(format!("No videos found for keyword: {}", query));
        }
        Ok(videos)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        logi(format!("Downloading video: {}", url));
        let mut resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .context("Footage download request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Footage download HTTP {}", resp.status().as_u16());
        }

        if let Some(parent) = dest.parent() {
            ensure_dir(parent).await?;
        }
        let written = async {
            let mut out = fs::File::create(dest)
                .await
                .with_context(|| format!("create clip file: {}", dest.display()))?;
            while let Some(chunk) = resp.chunk().await.context("Footage download stream failed")? {
                out.write_all(&chunk).await?;
            }
            out.flush().await?;
            anyhow::Ok(())
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(dest).await;
            return Err(err);
        }
        Ok(())
    }
}
