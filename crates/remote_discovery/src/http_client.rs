//! reqwest implementation of [`PeerClient`].

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode};

use remote_model::EndpointDescription;

use crate::client::{base_url, PeerClient};

pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    pub fn new(timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch_endpoint(
        &self,
        host: &str,
        port: u16,
        path: &str,
        uid: &str,
    ) -> anyhow::Result<Option<EndpointDescription>> {
        let url = format!("{}{}/endpoint/{uid}", base_url(host, port), path.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("GET {url} returned status {}", resp.status());
        }

        let description = resp
            .json::<EndpointDescription>()
            .await
            .with_context(|| format!("parse endpoint description from {url}"))?;
        Ok(Some(description))
    }

    async fn send_discovered(
        &self,
        host: &str,
        port: u16,
        path: &str,
        endpoints: &[EndpointDescription],
    ) -> anyhow::Result<()> {
        let url = format!("{}{path}", base_url(host, port));
        let resp = self
            .client
            .post(&url)
            .json(endpoints)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        if !resp.status().is_success() {
            anyhow::bail!("POST {url} returned status {}", resp.status());
        }
        Ok(())
    }
}
