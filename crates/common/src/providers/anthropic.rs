//! Anthropic Messages API client

use super::{LlmProvider, ProviderId};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn call_failed(message: String) -> AppError {
        AppError::ProviderCallFailed {
            provider: ProviderId::Claude.display_name().to_string(),
            message,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn generate(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = MessagesRequest {
            model,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::call_failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::call_failed(format!("API error {}: {}", status, body)));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Self::call_failed(format!("failed to parse response: {}", e)))?;

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generate_joins_text_blocks() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "secret");
                assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
                assert_eq!(body["model"], "claude-test");
                assert_eq!(body["max_tokens"], 42);
                assert_eq!(body["messages"][0]["content"], "Hello");
                Json(json!({ "content": [{ "type": "text", "text": "Brisbane " }, { "type": "text", "text": "is growing" }] }))
            }),
        );
        let base = serve(app).await;

        let provider = AnthropicProvider::new(" secret ", &base, Duration::from_secs(5)).unwrap();
        let text = provider.generate("claude-test", "Hello", 42).await.unwrap();
        assert_eq!(text, "Brisbane is growing");
    }

    #[tokio::test]
    async fn test_api_error_is_call_failure() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = serve(app).await;

        let provider = AnthropicProvider::new("key", &base, Duration::from_secs(5)).unwrap();
        let err = provider.generate("claude-test", "Hello", 10).await.unwrap_err();
        assert!(matches!(err, AppError::ProviderCallFailed { .. }));
        assert!(err.to_string().contains("429"));
    }
}
