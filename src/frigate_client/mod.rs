//! FrigateClient - event source adapter
//!
//! ## Responsibilities
//!
//! - Fetch the snapshot JPEG of a tracked-object event
//! - Push sub-label updates back to the event source

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default request timeout for the event source
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Event source the coordinator and pipelines talk to
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Base address, for logs
    fn base_url(&self) -> &str;

    /// Snapshot image of an event
    async fn snapshot(&self, event_id: &str) -> Result<Arc<[u8]>>;

    /// Attach a sub-label to an event
    async fn set_sub_label(&self, event_id: &str, label: &str, score: f64) -> Result<()>;
}

/// Sub-label update body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLabelRequest<'a> {
    pub sub_label: &'a str,
    pub sub_label_score: f64,
}

/// HTTP client for the Frigate event API
pub struct FrigateClient {
    client: reqwest::Client,
    base_url: String,
}

impl FrigateClient {
    /// Create new client; trailing slashes on `base_url` are ignored
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client with the default timeout
    pub fn http_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(Error::from)
    }

    fn snapshot_url(&self, event_id: &str) -> String {
        format!("{}/api/events/{}/snapshot.jpg?crop=0", self.base_url, event_id)
    }

    fn sub_label_url(&self, event_id: &str) -> String {
        format!("{}/api/events/{}/sub_label", self.base_url, event_id)
    }
}

#[async_trait]
impl EventSource for FrigateClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn snapshot(&self, event_id: &str) -> Result<Arc<[u8]>> {
        tracing::debug!(event_id = %event_id, "Fetching event snapshot");
        let resp = self.client.get(self.snapshot_url(event_id)).send().await?;

        if !resp.status().is_success() {
            return Err(Error::EventSource(format!(
                "snapshot for event {} failed: {}",
                event_id,
                resp.status()
            )));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::EventSource(format!(
                "snapshot for event {} is empty",
                event_id
            )));
        }

        tracing::debug!(event_id = %event_id, size = bytes.len(), "Snapshot fetched");
        Ok(Arc::from(bytes.as_ref()))
    }

    async fn set_sub_label(&self, event_id: &str, label: &str, score: f64) -> Result<()> {
        let body = SubLabelRequest {
            sub_label: label,
            sub_label_score: score,
        };
        let resp = self
            .client
            .post(self.sub_label_url(event_id))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::EventSource(format!(
                "sub label update for event {} failed: {} - {}",
                event_id, status, text
            )));
        }

        tracing::info!(
            event_id = %event_id,
            sub_label = %label,
            score = score,
            "Sub label updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = FrigateClient::new(reqwest::Client::new(), "http://frigate:5000/");
        assert_eq!(client.base_url(), "http://frigate:5000");
        assert_eq!(
            client.snapshot_url("1720860695.72587-ja8pzq"),
            "http://frigate:5000/api/events/1720860695.72587-ja8pzq/snapshot.jpg?crop=0"
        );
        assert_eq!(
            client.sub_label_url("abc"),
            "http://frigate:5000/api/events/abc/sub_label"
        );
    }

    #[test]
    fn test_sub_label_body() {
        let body = SubLabelRequest {
            sub_label: "alice",
            sub_label_score: 0.8,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"subLabel": "alice", "subLabelScore": 0.8}));
    }
}
