//! Configuration for the pipeline, the LLM provider and the graph endpoint.
//!
//! Every struct has a `Default` and a `from_env()` constructor. Env values are
//! validated eagerly so a typo fails at startup rather than mid-request.

use std::time::Duration;

use crate::error::QaError;
use crate::llm::CompletionOptions;

pub const CINEGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "CINEGRAPH_LLM_TIMEOUT_SECS";
pub const CINEGRAPH_QUERY_TIMEOUT_SECS_ENV: &str = "CINEGRAPH_QUERY_TIMEOUT_SECS";
pub const CINEGRAPH_MAX_PROMPT_ROWS_ENV: &str = "CINEGRAPH_MAX_PROMPT_ROWS";
pub const CINEGRAPH_MAX_ANSWER_ROWS_ENV: &str = "CINEGRAPH_MAX_ANSWER_ROWS";
pub const CINEGRAPH_MAX_OUTPUT_TOKENS_ENV: &str = "CINEGRAPH_MAX_OUTPUT_TOKENS";
pub const CINEGRAPH_STRICT_GROUNDING_ENV: &str = "CINEGRAPH_STRICT_GROUNDING";
pub const CINEGRAPH_SKIP_LLM_EXTRACTION_ENV: &str = "CINEGRAPH_SKIP_LLM_EXTRACTION";

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const LOCAL_LLM_URL_ENV: &str = "LOCAL_LLM_URL";
pub const LOCAL_LLM_MODEL_ENV: &str = "LOCAL_LLM_MODEL";

pub const NEO4J_URL_ENV: &str = "NEO4J_URL";
pub const NEO4J_DATABASE_ENV: &str = "NEO4J_DATABASE";
pub const NEO4J_USER_ENV: &str = "NEO4J_USER";
pub const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";

const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
// The answer prompt carries at most this many rows; the rest is summarised as a count.
const DEFAULT_MAX_PROMPT_ROWS: usize = 40;
const DEFAULT_MAX_ANSWER_ROWS: usize = 25;
const DEFAULT_MAX_OUTPUT_TOKENS: usize = 600;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4-1106-preview";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_NEO4J_URL: &str = "http://localhost:7474";
const DEFAULT_NEO4J_DATABASE: &str = "neo4j";
const DEFAULT_NEO4J_USER: &str = "neo4j";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No LLM provider configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or LOCAL_LLM_URL")]
    NoProviderConfigured,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for QaError {
    fn from(err: ConfigError) -> Self {
        QaError::InvalidConfig(err.to_string())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Per-stage deadlines. `None` waits forever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTimeouts {
    pub extraction: Option<Duration>,
    pub synthesis: Option<Duration>,
    pub execution: Option<Duration>,
    pub answering: Option<Duration>,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        let llm = Some(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS));
        Self {
            extraction: llm,
            synthesis: llm,
            execution: Some(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)),
            answering: llm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QaConfig {
    pub timeouts: StageTimeouts,
    /// Rows rendered into the answer prompt.
    pub max_prompt_rows: usize,
    /// Rows rendered by the template answerer.
    pub max_answer_rows: usize,
    pub extraction_options: CompletionOptions,
    pub synthesis_options: CompletionOptions,
    pub answer_options: CompletionOptions,
    /// Replace LLM answers that mention values absent from the rows.
    pub strict_grounding: bool,
    /// In LLM mode, hand the raw question straight to the synthesizer.
    pub skip_extraction_in_llm_mode: bool,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            max_prompt_rows: DEFAULT_MAX_PROMPT_ROWS,
            max_answer_rows: DEFAULT_MAX_ANSWER_ROWS,
            extraction_options: CompletionOptions::new(300, 0.0),
            synthesis_options: CompletionOptions::new(512, 0.0),
            answer_options: CompletionOptions::new(DEFAULT_MAX_OUTPUT_TOKENS, 0.7),
            strict_grounding: true,
            skip_extraction_in_llm_mode: false,
        }
    }
}

impl QaConfig {
    /// Defaults overridden by `CINEGRAPH_*` env vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        let llm_timeout = env_timeout(CINEGRAPH_LLM_TIMEOUT_SECS_ENV, DEFAULT_LLM_TIMEOUT_SECS)?;
        cfg.timeouts.extraction = llm_timeout;
        cfg.timeouts.synthesis = llm_timeout;
        cfg.timeouts.answering = llm_timeout;
        cfg.timeouts.execution =
            env_timeout(CINEGRAPH_QUERY_TIMEOUT_SECS_ENV, DEFAULT_QUERY_TIMEOUT_SECS)?;

        cfg.max_prompt_rows =
            env_usize(CINEGRAPH_MAX_PROMPT_ROWS_ENV, DEFAULT_MAX_PROMPT_ROWS, 1, 500)?;
        cfg.max_answer_rows =
            env_usize(CINEGRAPH_MAX_ANSWER_ROWS_ENV, DEFAULT_MAX_ANSWER_ROWS, 1, 500)?;
        cfg.answer_options.max_tokens = Some(env_usize(
            CINEGRAPH_MAX_OUTPUT_TOKENS_ENV,
            DEFAULT_MAX_OUTPUT_TOKENS,
            16,
            32_000,
        )?);
        cfg.strict_grounding = env_bool(CINEGRAPH_STRICT_GROUNDING_ENV, true)?;
        cfg.skip_extraction_in_llm_mode = env_bool(CINEGRAPH_SKIP_LLM_EXTRACTION_ENV, false)?;
        Ok(cfg)
    }

    /// Apply one timeout to all three LLM-backed stages.
    pub fn with_llm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeouts.extraction = timeout;
        self.timeouts.synthesis = timeout;
        self.timeouts.answering = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeouts.execution = timeout;
        self
    }
}

// ============================================================================
// LLM provider
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
    /// OpenAI-compatible local server (Ollama, vLLM, llama.cpp).
    Local,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "local" | "ollama" => Ok(Provider::Local),
            other => Err(ConfigError::Invalid(format!(
                "unknown LLM provider {other:?} (expected openai|anthropic|local)"
            ))),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    /// Load from environment variables: OpenAI first, then Anthropic, then a
    /// local server.
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = env_u64(CINEGRAPH_LLM_TIMEOUT_SECS_ENV, DEFAULT_LLM_TIMEOUT_SECS)?;

        if let Some(key) = env_string(OPENAI_API_KEY_ENV) {
            return Ok(Self {
                provider: Provider::OpenAI,
                api_key: key,
                model: env_string(OPENAI_MODEL_ENV).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: env_string(OPENAI_BASE_URL_ENV),
                timeout_secs,
            });
        }

        if let Some(key) = env_string(ANTHROPIC_API_KEY_ENV) {
            return Ok(Self {
                provider: Provider::Anthropic,
                api_key: key,
                model: env_string(ANTHROPIC_MODEL_ENV)
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
                base_url: env_string(ANTHROPIC_BASE_URL_ENV),
                timeout_secs,
            });
        }

        if let Some(url) = env_string(LOCAL_LLM_URL_ENV) {
            return Ok(Self {
                provider: Provider::Local,
                api_key: String::new(),
                model: env_string(LOCAL_LLM_MODEL_ENV).unwrap_or_else(|| "llama3.2".to_string()),
                base_url: Some(url),
                timeout_secs,
            });
        }

        Err(ConfigError::NoProviderConfigured)
    }

    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::OpenAI,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }

    pub fn anthropic(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }

    pub fn local(url: &str, model: &str) -> Self {
        Self {
            provider: Provider::Local,
            api_key: String::new(),
            model: model.to_string(),
            base_url: Some(url.to_string()),
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }
}

// ============================================================================
// Graph endpoint
// ============================================================================

#[derive(Clone, PartialEq)]
pub struct GraphConfig {
    /// HTTP base URL of the Neo4j server, e.g. `http://localhost:7474`.
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NEO4J_URL.to_string(),
            database: DEFAULT_NEO4J_DATABASE.to_string(),
            user: DEFAULT_NEO4J_USER.to_string(),
            password: None,
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

impl GraphConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let url = env_string(NEO4J_URL_ENV).unwrap_or(defaults.url);
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "{NEO4J_URL_ENV}={url:?} must be an http(s) URL for the Neo4j HTTP API"
            )));
        }
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            database: env_string(NEO4J_DATABASE_ENV).unwrap_or(defaults.database),
            user: env_string(NEO4J_USER_ENV).unwrap_or(defaults.user),
            password: env_string(NEO4J_PASSWORD_ENV),
            timeout_secs: env_u64(CINEGRAPH_QUERY_TIMEOUT_SECS_ENV, DEFAULT_QUERY_TIMEOUT_SECS)?,
        })
    }
}

// ============================================================================
// Env helpers
// ============================================================================

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env_string(name) {
        None => Ok(default),
        Some(v) => v.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("invalid {name}={v:?} (expected integer seconds)"))
        }),
    }
}

/// Seconds from env; `0` disables the timeout.
fn env_timeout(name: &str, default: u64) -> Result<Option<Duration>, ConfigError> {
    let secs = env_u64(name, default)?;
    Ok(if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    })
}

fn env_usize(name: &str, default: usize, min: usize, max: usize) -> Result<usize, ConfigError> {
    match env_string(name) {
        None => Ok(default),
        Some(v) => {
            let n = v.parse::<usize>().map_err(|_| {
                ConfigError::Invalid(format!("invalid {name}={v:?} (expected integer)"))
            })?;
            Ok(n.clamp(min, max))
        }
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env_string(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(format!(
                "invalid {name}={v:?} (expected true|false)"
            ))),
        },
    }
}
