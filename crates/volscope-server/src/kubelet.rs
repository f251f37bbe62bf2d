use crate::config::{ConfigError, ServerConfig, TelemetryConfig};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use volscope_core::{TelemetryClient, TelemetryUnavailable};

/// Fetches `/stats/summary` straight from each node's kubelet.
pub struct KubeletClient {
    client: reqwest::Client,
    url_template: String,
    bearer_token: Option<String>,
}

impl KubeletClient {
    pub fn new(
        url_template: impl Into<String>,
        timeout: Duration,
        bearer_token: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url_template: url_template.into(),
            bearer_token,
        }
    }

    /// Returns `None` when the config selects the API server proxy instead.
    pub fn from_config(config: &ServerConfig) -> Result<Option<Self>, ConfigError> {
        match &config.telemetry {
            TelemetryConfig::Proxy => Ok(None),
            TelemetryConfig::Kubelet {
                summary_url_template,
                bearer_token_file,
            } => {
                let token = bearer_token_file.as_deref().map(read_token).transpose()?;
                Ok(Some(Self::new(
                    summary_url_template.clone(),
                    config.node_timeout(),
                    token,
                )))
            }
        }
    }

    pub fn summary_url(&self, node_id: &str) -> String {
        self.url_template.replace("{node}", node_id)
    }
}

fn read_token(path: &Path) -> Result<String, ConfigError> {
    let token = std::fs::read_to_string(path)?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::Invalid(format!("bearer token file {} is empty", path.display())));
    }
    Ok(token.to_string())
}

#[async_trait]
impl TelemetryClient for KubeletClient {
    async fn fetch_summary(&self, node_id: &str) -> Result<Vec<u8>, TelemetryUnavailable> {
        let url = self.summary_url(node_id);
        let mut request = self.client.get(&url);
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| TelemetryUnavailable::Unreachable {
            node: node_id.to_string(),
            reason: format!("Connection error: {}", e),
        })?;

        if !response.status().is_success() {
            return Err(TelemetryUnavailable::HttpStatus {
                node: node_id.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| TelemetryUnavailable::Unreachable {
            node: node_id.to_string(),
            reason: format!("Read error: {}", e),
        })?;
        tracing::trace!(node = node_id, bytes = body.len(), "summary fetched");
        Ok(body.to_vec())
    }
}
