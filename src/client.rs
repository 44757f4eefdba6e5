//! Chat-completion API client
//!
//! One POST per prompt, no streaming and no retries. Failures are classified
//! into [`CompletionError`] whose `Display` text is what the pane shows.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Payload flavour the endpoint expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// `{model, prompt, ...}` answered with `choices[0].text`
    Legacy,
    /// `{model, messages, ...}` answered with `choices[0].message.content`
    Chat,
}

/// Everything needed to talk to one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub endpoint_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub request_shape: RequestShape,
}

/// Classified request failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// HTTP 401: the stored key must be purged
    #[error("Error: 401 - {message}")]
    Auth { message: String },

    /// Any other non-2xx status
    #[error("Error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Request went out but nothing came back (refused, reset, DNS, timeout)
    #[error("Error: No response received from server.")]
    NoResponse { detail: String },

    /// Request could not be built, or the reply made no sense
    #[error("Error: {0}")]
    Client(String),
}

impl CompletionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CompletionError::Auth { .. })
    }

    /// Short classification label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Auth { .. } => "auth",
            CompletionError::Http { .. } => "http",
            CompletionError::NoResponse { .. } => "network",
            CompletionError::Client(_) => "client",
        }
    }
}

/// Anything that can turn a prompt into text
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, api_key: &str) -> Result<String, CompletionError>;
}

/// reqwest-backed completer for one configured endpoint
pub struct CompletionClient {
    http: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str, api_key: &str) -> Result<String, CompletionError> {
        let cfg = &self.config;
        let request = CompletionRequest::new(cfg, prompt);
        let started = Instant::now();

        debug!(
            endpoint = %cfg.endpoint_url,
            model = %cfg.model,
            shape = ?cfg.request_shape,
            prompt_chars = prompt.chars().count(),
            "sending completion request"
        );

        let response = self
            .http
            .post(&cfg.endpoint_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(cfg.timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!(status = status.as_u16(), %message, "completion request rejected");
            return Err(if status == StatusCode::UNAUTHORIZED {
                CompletionError::Auth { message }
            } else {
                CompletionError::Http {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let text = extract_text(cfg.request_shape, &body)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "completion received"
        );
        Ok(text)
    }
}

/// Map a reqwest failure onto the pane's error classes
fn classify_transport(err: reqwest::Error) -> CompletionError {
    let classified = if err.is_timeout() || err.is_connect() || err.is_request() {
        CompletionError::NoResponse {
            detail: err.to_string(),
        }
    } else {
        CompletionError::Client(err.to_string())
    };
    warn!(kind = classified.kind(), error = %err, "completion transport failure");
    classified
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> String {
    let value: Option<serde_json::Value> = serde_json::from_str(body).ok();
    value
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .or_else(|| v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()))
        })
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Extract the generated text from a success envelope
fn extract_text(shape: RequestShape, body: &str) -> Result<String, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Client(format!("Failed to parse response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Client("Response contained no choices".into()))?;

    let text = match shape {
        RequestShape::Legacy => choice.text,
        RequestShape::Chat => choice.message.and_then(|m| m.content),
    };

    text.ok_or_else(|| CompletionError::Client("Response contained no completion text".into()))
}

// ═══════════════════════════════════════════════════════════════
// API Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CompletionRequest<'a> {
    Legacy {
        model: &'a str,
        prompt: &'a str,
        max_tokens: u32,
        temperature: f32,
    },
    Chat {
        model: &'a str,
        messages: Vec<ChatMessage<'a>>,
        max_tokens: u32,
        temperature: f32,
    },
}

impl<'a> CompletionRequest<'a> {
    fn new(cfg: &'a CompletionConfig, prompt: &'a str) -> Self {
        match cfg.request_shape {
            RequestShape::Legacy => CompletionRequest::Legacy {
                model: &cfg.model,
                prompt,
                max_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
            },
            RequestShape::Chat => CompletionRequest::Chat {
                model: &cfg.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                max_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: Option<String>,
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(shape: RequestShape) -> CompletionConfig {
        CompletionConfig {
            endpoint_url: "http://localhost/v1".into(),
            model: "test-model".into(),
            max_tokens: 64,
            temperature: 0.5,
            timeout: Duration::from_secs(1),
            request_shape: shape,
        }
    }

    #[test]
    fn test_chat_request_body() {
        let cfg = config(RequestShape::Chat);
        let body = serde_json::to_value(CompletionRequest::new(&cfg, "hi")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 64,
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn test_client_keeps_its_config() {
        let client = CompletionClient::new(config(RequestShape::Legacy));
        assert_eq!(client.config().model, "test-model");
        assert_eq!(client.config().request_shape, RequestShape::Legacy);
        assert_eq!(client.config().timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_legacy_request_body() {
        let cfg = config(RequestShape::Legacy);
        let body = serde_json::to_value(CompletionRequest::new(&cfg, "")).unwrap();
        assert_eq!(body["prompt"], "");
        assert_eq!(body["model"], "test-model");
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn test_extract_text_per_shape() {
        let chat = r#"{"choices":[{"message":{"role":"assistant","content":"X"}}]}"#;
        assert_eq!(extract_text(RequestShape::Chat, chat).unwrap(), "X");

        let legacy = r#"{"choices":[{"text":"Y"}]}"#;
        assert_eq!(extract_text(RequestShape::Legacy, legacy).unwrap(), "Y");

        // Right envelope, wrong shape
        assert!(matches!(
            extract_text(RequestShape::Legacy, chat),
            Err(CompletionError::Client(_))
        ));
    }

    #[test]
    fn test_extract_text_rejects_empty_choices() {
        let err = extract_text(RequestShape::Chat, r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.to_string(), "Error: Response contained no choices");
    }

    #[test]
    fn test_error_message_sources() {
        assert_eq!(error_message(r#"{"message":"boom"}"#), "boom");
        assert_eq!(error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message("<html>gateway</html>"), "Unknown error");
        assert_eq!(error_message(""), "Unknown error");
        assert_eq!(error_message(r#"{"message":""}"#), "Unknown error");
    }

    #[test]
    fn test_error_display() {
        let http = CompletionError::Http {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(http.to_string(), "Error: 500 - boom");

        let auth = CompletionError::Auth {
            message: "Unknown error".into(),
        };
        assert_eq!(auth.to_string(), "Error: 401 - Unknown error");
        assert!(auth.is_auth());

        let net = CompletionError::NoResponse {
            detail: "connection refused".into(),
        };
        assert_eq!(net.to_string(), "Error: No response received from server.");
        assert_eq!(net.kind(), "network");
    }
}
