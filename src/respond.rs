//! Chat-completion call with a fail-soft boundary.
//!
//! The [`Responder`] sends one user message to an OpenAI-compatible
//! `/v1/chat/completions` endpoint (a local Ollama server or the hosted
//! OpenAI API) with `temperature = 0`, a token cap, and a timeout.
//!
//! It never returns an error. Any failure becomes [`Answer::Degraded`],
//! whose text reads `Model error: <kind>: <message>`, so there is always
//! something to show the user while callers can still tell the two apart.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Transport-level failures of a completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Connection(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Configuration(String),
}

impl CompletionError {
    /// Short name of the failure, embedded in degraded answers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::Connection(_) => "ConnectionError",
            Self::Status { .. } => "StatusError",
            Self::MalformedResponse(_) => "MalformedResponse",
            Self::Configuration(_) => "ConfigurationError",
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Parameters of one completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// OpenAI-compatible chat endpoint, used for both Ollama (`{url}/v1`) and OpenAI.
pub struct OpenAiCompatibleChat {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleChat {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Build the provider selected by `config.provider`.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        match config.provider.as_str() {
            "ollama" => Self::new(
                "ollama",
                format!("{}/v1", config.url.trim_end_matches('/')),
                Some("ollama".to_string()),
                config.timeout(),
            ),
            "openai" => Self::new(
                "openai",
                OPENAI_BASE_URL,
                std::env::var("OPENAI_API_KEY").ok(),
                config.timeout(),
            ),
            other => anyhow::bail!("Unknown LLM provider: {}", other),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatBody {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: 0.0,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        match &self.api_key {
            Some(key) => builder = builder.bearer_auth(key),
            None if self.name == "openai" => {
                return Err(CompletionError::Configuration(
                    "OPENAI_API_KEY environment variable not set".to_string(),
                ))
            }
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response.json().await?;
        parse_completion(&payload)
    }
}

/// Extract `choices[0].message.content`; a `null` content is an empty answer.
fn parse_completion(payload: &serde_json::Value) -> Result<String, CompletionError> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            CompletionError::MalformedResponse("missing choices[0].message".to_string())
        })?;

    match message.get("content") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Null) | None => Ok(String::new()),
        Some(other) => Err(CompletionError::MalformedResponse(format!(
            "unexpected content type: {}",
            other
        ))),
    }
}

/// Outcome of a [`Responder::respond`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Trimmed model output.
    Generated(String),
    /// The call failed; `kind` names the failure.
    Degraded { kind: String, message: String },
}

impl Answer {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Displayable text for either variant.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated(text) => f.write_str(text),
            Self::Degraded { kind, message } => write!(f, "Model error: {}: {}", kind, message),
        }
    }
}

/// Sends prompts to the configured chat model.
#[derive(Clone)]
pub struct Responder {
    provider: Arc<dyn ChatProvider>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl Responder {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let provider = OpenAiCompatibleChat::from_config(config)?;
        Ok(Self::new(
            Arc::new(provider),
            config.model(),
            config.max_tokens,
            config.timeout(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model. Never fails; see [`Answer`].
    pub async fn respond(&self, prompt: &str) -> Answer {
        let request = CompletionRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
        };

        let outcome = tokio::time::timeout(self.timeout, self.provider.complete(&request))
            .await
            .unwrap_or_else(|_| {
                Err(CompletionError::Timeout(format!(
                    "no reply within {:?}",
                    self.timeout
                )))
            });

        match outcome {
            Ok(text) => Answer::Generated(text.trim().to_string()),
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    model = %self.model,
                    kind = e.kind(),
                    error = %e,
                    "completion failed; returning degraded answer"
                );
                Answer::Degraded {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replies with fixed text, or fails with the given HTTP status and body.
    struct Scripted(Result<&'static str, (u16, &'static str)>);

    #[async_trait]
    impl ChatProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            assert_eq!(request.max_tokens, 256);
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err((status, body)) => Err(CompletionError::Status {
                    status,
                    body: body.to_string(),
                }),
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl ChatProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".to_string())
        }
    }

    fn responder(provider: impl ChatProvider + 'static, timeout: Duration) -> Responder {
        Responder::new(Arc::new(provider), "test-model", 256, timeout)
    }

    #[tokio::test]
    async fn test_generated_answer_is_trimmed() {
        let r = responder(Scripted(Ok("  Globex [row 1]\n")), Duration::from_secs(5));
        let answer = r.respond("prompt").await;
        assert_eq!(answer, Answer::Generated("Globex [row 1]".to_string()));
        assert!(!answer.is_degraded());
    }

    #[tokio::test]
    async fn test_timeout_is_degraded_not_error() {
        let r = responder(Slow, Duration::from_millis(50));
        let answer = r.respond("prompt").await;
        assert!(answer.is_degraded());
        let text = answer.text();
        assert!(text.starts_with("Model error: Timeout:"), "got {}", text);
    }

    #[tokio::test]
    async fn test_status_error_is_degraded() {
        let r = responder(Scripted(Err((503, "overloaded"))), Duration::from_secs(5));
        let text = r.respond("prompt").await.text();
        assert_eq!(text, "Model error: StatusError: HTTP 503: overloaded");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_degraded() {
        // Port 9 (discard) on localhost is not expected to speak HTTP.
        let provider = OpenAiCompatibleChat::new(
            "ollama",
            "http://127.0.0.1:9/v1",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let r = responder(provider, Duration::from_secs(3));
        let answer = r.respond("prompt").await;
        assert!(answer.is_degraded());
        assert!(answer.text().starts_with("Model error: "));
    }

    #[test]
    fn test_parse_completion() {
        let ok = serde_json::json!({ "choices": [{ "message": { "content": "hi" } }] });
        assert_eq!(parse_completion(&ok).unwrap(), "hi");

        let null = serde_json::json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(parse_completion(&null).unwrap(), "");

        let bad = serde_json::json!({ "error": "nope" });
        assert_eq!(parse_completion(&bad).unwrap_err().kind(), "MalformedResponse");
    }

    #[test]
    fn test_from_config_selects_endpoint() {
        let config = LlmConfig::default();
        let chat = OpenAiCompatibleChat::from_config(&config).unwrap();
        assert_eq!(chat.name(), "ollama");
        assert_eq!(chat.base_url, "http://localhost:11434/v1");
    }
}
