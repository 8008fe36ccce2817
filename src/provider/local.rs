//! Ollama-native chat client.
//!
//! Speaks `POST {base}/api/chat` with `stream: false` and forwards the
//! local-inference tuning knobs (`num_ctx`, `num_gpu`) through the `options`
//! object. Local backends take no credential.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::ProviderSpec;
use crate::provider::client::{CompletionRequest, ProviderClient, ProviderError};

pub struct LocalInferenceClient {
    http: reqwest::Client,
}

impl LocalInferenceClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for LocalInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for LocalInferenceClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        spec: &ProviderSpec,
        _credential: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", spec.base_url.trim_end_matches('/'));

        let mut body = json!({
            "model": spec.default_model,
            "messages": request.messages(),
            "stream": false,
        });
        let mut options = serde_json::Map::new();
        if let Some(num_ctx) = spec.num_ctx {
            options.insert("num_ctx".into(), json!(num_ctx));
        }
        if let Some(num_gpu) = spec.num_gpu {
            options.insert("num_gpu".into(), json!(num_gpu));
        }
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
        }

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Upstream(format!(
                "local inference returned HTTP {}",
                status.as_u16()
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        payload
            .pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                ProviderError::Upstream("malformed response: missing message.content".into())
            })
    }
}
