//! OpenAI-compatible chat client.
//!
//! Speaks `POST {base}/v1/chat/completions` with a bearer credential. A
//! per-request credential (runtime override) takes precedence over the key
//! in the spec. When the endpoint is OpenRouter the attribution headers it
//! expects are added.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::ProviderSpec;
use crate::provider::client::{CompletionRequest, ProviderClient, ProviderError};

pub struct HostedApiClient {
    http: reqwest::Client,
}

impl HostedApiClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HostedApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for HostedApiClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        spec: &ProviderSpec,
        credential: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let key = credential.or(spec.api_key.as_deref()).ok_or_else(|| {
            ProviderError::Upstream("no credential configured for hosted backend".into())
        })?;

        let url = format!(
            "{}/v1/chat/completions",
            spec.base_url.trim_end_matches('/')
        );

        let mut body = json!({
            "model": spec.default_model,
            "messages": request.messages(),
        });
        if let Some(temperature) = spec.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = spec.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let mut builder = self
            .http
            .post(&url)
            .timeout(timeout)
            .bearer_auth(key)
            .json(&body);

        // OpenRouter asks callers to identify themselves.
        if spec.base_url.contains("openrouter") {
            builder = builder
                .header("HTTP-Referer", "https://voxen-ai.local")
                .header("X-Title", "VOXEN AI");
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            // Status only: response bodies can echo request content and must
            // never surface in error detail.
            return Err(ProviderError::Upstream(format!(
                "hosted API returned HTTP {}",
                status.as_u16()
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                ProviderError::Upstream(
                    "malformed response: missing choices[0].message.content".into(),
                )
            })
    }
}
