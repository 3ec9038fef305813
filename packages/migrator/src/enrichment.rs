use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;

use crate::config::EnrichmentSettings;

/// Client for the identity API that serves organization-instance
/// documents. Package rows embed the fetched document verbatim.
#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl EnrichmentClient {
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        }
    }

    pub async fn organization_instance(
        &self,
        organization_id: &str,
        instance_id: i32,
    ) -> Result<JsonValue> {
        let url = format!(
            "{}/identity/v1/organization-instance/{instance_id}",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .header("accept", "*/*")
            .header("x-organization-id", organization_id)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to send organization-instance request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("organization-instance lookup returned {status}: {body}");
        }

        response
            .json()
            .await
            .context("failed to decode organization-instance response")
    }
}
