//! Completion interface and provider plumbing.
//!
//! The pipeline only ever asks for text: `complete(prompt, options) → text`.
//! Everything about a particular vendor lives in [`providers`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{QaError, Result};

#[cfg(any(feature = "openai", feature = "anthropic", feature = "local"))]
pub mod providers;

// ============================================================================
// Provider Interface
// ============================================================================

/// Trait for LLM API providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the given messages.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError>;

    fn model_info(&self) -> ModelInfo;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn new(max_tokens: usize, temperature: f32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: Some(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub options: CompletionOptions,
    /// Ask the provider for a JSON object response when it supports one.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, options: CompletionOptions) -> Self {
        Self {
            messages: vec![
                Message {
                    role: Role::System,
                    content: system.into(),
                },
                Message {
                    role: Role::User,
                    content: user.into(),
                },
            ],
            options,
            json_mode: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn system(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// The last user message, which carries the per-request content.
    pub fn user(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
}

impl From<LlmError> for QaError {
    fn from(err: LlmError) -> Self {
        QaError::LlmUnavailable(err.to_string())
    }
}

/// Run one completion under `timeout` and return its trimmed text.
///
/// Transport failures, timeouts and empty responses all surface as
/// `LlmUnavailable`; any non-empty text is handed to the caller's parser.
pub async fn complete_text(
    provider: &dyn CompletionProvider,
    request: CompletionRequest,
    timeout: Option<Duration>,
) -> Result<String> {
    let call = provider.complete(request);
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            QaError::LlmUnavailable(format!(
                "completion timed out after {}s",
                limit.as_secs_f32()
            ))
        })??,
        None => call.await?,
    };

    if response.finish_reason == FinishReason::Length {
        tracing::warn!(model = %response.model, "completion truncated at max_tokens");
    }
    let text = response.content.trim();
    if text.is_empty() {
        return Err(QaError::LlmUnavailable(format!(
            "model `{}` returned an empty completion",
            response.model
        )));
    }
    Ok(text.to_string())
}

/// Best-effort JSON object recovery from model output.
///
/// Tries the whole text first, then the first brace-balanced object (outside
/// string literals). Models routinely wrap JSON in prose or markdown fences.
pub fn parse_llm_json_object<T: DeserializeOwned>(text: &str) -> std::result::Result<T, String> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    let Some(start) = trimmed.find('{') else {
        return Err("no '{' found in completion".to_string());
    };

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escape = false;
    let mut end: Option<usize> = None;

    for (idx, ch) in trimmed.char_indices().skip_while(|(i, _)| *i < start) {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(end) = end else {
        return Err("unbalanced JSON object in completion".to_string());
    };
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| format!("invalid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        answer: String,
    }

    #[test]
    fn recovers_json_wrapped_in_prose() {
        let text = "Sure! Here you go:\n```json\n{\"answer\": \"a } brace\"}\n```\nAnything else?";
        let p: Payload = parse_llm_json_object(text).unwrap();
        assert_eq!(p.answer, "a } brace");
    }

    #[test]
    fn rejects_text_without_objects() {
        assert!(parse_llm_json_object::<Payload>("no json here").is_err());
        assert!(parse_llm_json_object::<Payload>("{\"answer\": \"open").is_err());
    }

    #[test]
    fn request_accessors() {
        let req = CompletionRequest::new("sys", "user text", CompletionOptions::default()).json();
        assert_eq!(req.system(), Some("sys"));
        assert_eq!(req.user(), "user text");
        assert!(req.json_mode);
    }
}
