//! HTTP adapter for the social-posting provider.
//!
//! Sends `POST {base_url}/post` with a JSON [`PublishRequest`] body and a
//! bearer key, and decodes the JSON [`ProviderResponse`]. HTTP 429 and 5xx
//! map to retryable errors; other non-2xx statuses do not.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use crate::config::ProviderConfig;
use crate::core::provider::{PostingProvider, ProviderError, ProviderResponse, PublishRequest};

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Posting provider reached over HTTP.
pub struct HttpPostingProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPostingProvider {
    /// Build a client from provider configuration.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Transport`] if the `reqwest` client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("prometheus-publisher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/post", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    /// Full URL posts are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl PostingProvider for HttpPostingProvider {
    async fn publish(&self, request: PublishRequest) -> Result<ProviderResponse, ProviderError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            tracing::warn!(platform = %request.platform, ?retry_after_secs, "provider rate limited");
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let parsed: ProviderResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        tracing::debug!(
            platform = %request.platform,
            success = parsed.success,
            provider_job_id = ?parsed.provider_job_id,
            "provider responded"
        );
        Ok(parsed)
    }
}
