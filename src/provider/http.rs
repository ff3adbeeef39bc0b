//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};

use super::{ProviderError, TranslationProvider};

/// Longest slice of an error body carried into `ProviderError::Status`.
const ERROR_BODY_LIMIT: usize = 300;

const BATCH_INSTRUCTIONS: &str = "You translate user interface strings. \
The user message is JSON of the form {\"targetLanguage\": ..., \"texts\": [...]}. \
Reply with JSON {\"translations\": [...]} containing exactly one translation per input text, \
in the same order. Never merge, split, drop or reorder entries.";

const SINGLE_INSTRUCTIONS: &str = "You translate a single user interface string. \
Reply with the translated string only: no quotes, no notes, no markdown.";

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

pub struct HttpProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl HttpProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ProviderError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let body = json!({
            "model": self.settings.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "provider returned non-success status");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let raw = resp.text().await?;
        let envelope: ChatCompletion = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::MalformedEnvelope(e.to_string()))?;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedEnvelope("no message content".to_string()))?;

        trace!(bytes = content.len(), "provider completion received");
        Ok(content)
    }
}

#[async_trait]
impl TranslationProvider for HttpProvider {
    fn is_configured(&self) -> bool {
        self.settings
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    async fn translate_batch(
        &self,
        target_language: &str,
        texts: &[String],
    ) -> Result<String, ProviderError> {
        let user = json!({ "targetLanguage": target_language, "texts": texts }).to_string();
        self.complete(BATCH_INSTRUCTIONS, user).await
    }

    async fn translate_one(
        &self,
        target_language: &str,
        text: &str,
    ) -> Result<String, ProviderError> {
        let user = format!("Target language: {target_language}\n\n{text}");
        self.complete(SINGLE_INSTRUCTIONS, user).await
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn provider(base_url: String, api_key: Option<&str>) -> HttpProvider {
        HttpProvider::new(ProviderSettings {
            api_key: api_key.map(str::to_string),
            base_url,
            model: "test-model".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn batch_request_carries_language_texts_and_bearer() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer secret");
                assert_eq!(body["model"], "test-model");
                let user: Value =
                    serde_json::from_str(body["messages"][1]["content"].as_str().unwrap())
                        .unwrap();
                assert_eq!(user["targetLanguage"], "fr");
                assert_eq!(user["texts"], serde_json::json!(["one", "two"]));
                Json(serde_json::json!({
                    "choices": [{ "message": { "content": "{\"translations\":[\"un\",\"deux\"]}" } }]
                }))
            }),
        );
        let base = serve(router).await;

        let payload = provider(base, Some("secret"))
            .translate_batch("fr", &["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(payload, r#"{"translations":["un","deux"]}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(router).await;

        let err = provider(base, Some("secret"))
            .translate_one("de", "hello")
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(serde_json::json!({ "choices": [] })) }),
        );
        let base = serve(router).await;

        let err = provider(base, Some("secret"))
            .translate_one("de", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let provider = provider("http://127.0.0.1:9/v1".to_string(), None);
        assert!(!provider.is_configured());
        let err = provider.translate_one("de", "hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[test]
    fn blank_key_is_not_configured() {
        assert!(!provider("http://localhost/v1".to_string(), Some("  ")).is_configured());
        assert!(provider("http://localhost/v1".to_string(), Some("k")).is_configured());
    }
}
