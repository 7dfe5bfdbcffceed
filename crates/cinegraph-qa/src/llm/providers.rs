//! LLM API providers
//!
//! Concrete clients for OpenAI, Anthropic and OpenAI-compatible local servers.

use super::*;
use crate::config::{ConfigError, LlmConfig, Provider};
use reqwest::Client;

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

fn http_client(config: &LlmConfig) -> std::result::Result<Client, ConfigError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    format!("{status}: {}", text.trim())
}

// ============================================================================
// OpenAI-compatible chat completions (shared by OpenAI and local servers)
// ============================================================================

#[cfg(any(feature = "openai", feature = "local"))]
fn chat_completions_body(model: &str, request: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
    });
    if let Some(max_tokens) = request.options.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(temp) = request.options.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    body
}

#[cfg(any(feature = "openai", feature = "local"))]
fn parse_chat_completion(
    data: &serde_json::Value,
    model: &str,
) -> std::result::Result<CompletionResponse, LlmError> {
    let content = data["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))?
        .to_string();

    let finish_reason = match data["choices"][0]["finish_reason"].as_str() {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };

    Ok(CompletionResponse {
        content,
        finish_reason,
        usage: Usage {
            prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
        },
        model: data["model"].as_str().unwrap_or(model).to_string(),
    })
}

// ============================================================================
// OpenAI Provider
// ============================================================================

#[cfg(feature = "openai")]
pub struct OpenAIClient {
    client: Client,
    config: LlmConfig,
}

#[cfg(feature = "openai")]
impl OpenAIClient {
    pub fn new(config: LlmConfig) -> std::result::Result<Self, ConfigError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::Invalid("OpenAI provider requires an API key".into()));
        }
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_DEFAULT_BASE)
                .trim_end_matches('/')
        )
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl CompletionProvider for OpenAIClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, LlmError> {
        let mut body = chat_completions_body(&self.config.model, &request);
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }
        if !response.status().is_success() {
            return Err(LlmError::Api(error_body(response).await));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_chat_completion(&data, &self.config.model)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.model.clone(),
            provider: "openai".into(),
        }
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

#[cfg(feature = "anthropic")]
pub struct AnthropicClient {
    client: Client,
    config: LlmConfig,
}

#[cfg(feature = "anthropic")]
impl AnthropicClient {
    pub fn new(config: LlmConfig) -> std::result::Result<Self, ConfigError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::Invalid("Anthropic provider requires an API key".into()));
        }
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/messages",
            self.config
                .base_url
                .as_deref()
                .unwrap_or(ANTHROPIC_DEFAULT_BASE)
                .trim_end_matches('/')
        )
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl CompletionProvider for AnthropicClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, LlmError> {
        // The system prompt is a top-level field, not a message.
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.options.max_tokens.unwrap_or(1024),
        });
        if let Some(sys) = request.system() {
            body["system"] = serde_json::json!(sys);
        }
        if let Some(temp) = request.options.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let response = self
            .client
            .post(self.url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                retry_after_ms: 60_000,
            });
        }
        if !response.status().is_success() {
            return Err(LlmError::Api(error_body(response).await));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| LlmError::InvalidResponse("missing content blocks".into()))?;

        let finish_reason = match data["stop_reason"].as_str() {
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            finish_reason,
            usage: Usage {
                prompt_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                completion_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: self.config.model.clone(),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.model.clone(),
            provider: "anthropic".into(),
        }
    }
}

// ============================================================================
// Local Provider (Ollama, vLLM, llama.cpp in OpenAI mode)
// ============================================================================

#[cfg(feature = "local")]
pub struct LocalClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

#[cfg(feature = "local")]
impl LocalClient {
    pub fn new(config: LlmConfig) -> std::result::Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| ConfigError::Invalid("local provider requires LOCAL_LLM_URL".into()))?
            .trim_end_matches('/')
            .to_string();
        let client = http_client(&config)?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }
}

#[cfg(feature = "local")]
#[async_trait]
impl CompletionProvider for LocalClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = chat_completions_body(&self.config.model, &request);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Api(format!(
                "local server error {}",
                error_body(response).await
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_chat_completion(&data, &self.config.model)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.config.model.clone(),
            provider: "local".into(),
        }
    }
}

// ============================================================================
// Unified Client
// ============================================================================

/// Dispatches to whichever provider the configuration names.
pub enum UnifiedClient {
    #[cfg(feature = "openai")]
    OpenAI(OpenAIClient),
    #[cfg(feature = "anthropic")]
    Anthropic(AnthropicClient),
    #[cfg(feature = "local")]
    Local(LocalClient),
}

impl UnifiedClient {
    pub fn from_config(config: LlmConfig) -> std::result::Result<Self, ConfigError> {
        match config.provider {
            #[cfg(feature = "openai")]
            Provider::OpenAI => Ok(Self::OpenAI(OpenAIClient::new(config)?)),
            #[cfg(feature = "anthropic")]
            Provider::Anthropic => Ok(Self::Anthropic(AnthropicClient::new(config)?)),
            #[cfg(feature = "local")]
            Provider::Local => Ok(Self::Local(LocalClient::new(config)?)),
            #[allow(unreachable_patterns)]
            other => Err(ConfigError::Invalid(format!(
                "provider {other:?} is not compiled into this build"
            ))),
        }
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_config(LlmConfig::from_env()?)
    }

    fn inner(&self) -> &dyn CompletionProvider {
        match self {
            #[cfg(feature = "openai")]
            Self::OpenAI(c) => c,
            #[cfg(feature = "anthropic")]
            Self::Anthropic(c) => c,
            #[cfg(feature = "local")]
            Self::Local(c) => c,
        }
    }
}

#[async_trait]
impl CompletionProvider for UnifiedClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, LlmError> {
        self.inner().complete(request).await
    }

    fn model_info(&self) -> ModelInfo {
        self.inner().model_info()
    }
}
