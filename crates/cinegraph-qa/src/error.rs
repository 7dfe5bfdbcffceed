//! Error kinds surfaced by the question-answering pipeline.
//!
//! Stage-local recoverable conditions (an unparseable extraction, for
//! example) never become a `QaError`; they are absorbed where they happen and
//! downgraded to a default value. Everything here reaches the orchestrator,
//! which maps it to one user-facing message plus a stable failure code.

use std::fmt;

pub type Result<T> = std::result::Result<T, QaError>;

/// Which way the graph engine refused a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailure {
    /// The engine could not parse or type-check the query.
    Syntax,
    /// The query compiled but failed while running (or timed out).
    Runtime,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFailure::Syntax => f.write_str("syntax"),
            ExecutionFailure::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QaError {
    /// Direct mode has no template for the extracted intent (or the intent
    /// lacks the entities its template needs).
    #[error("unsupported intent `{intent}`: {reason}")]
    UnsupportedIntent { intent: String, reason: String },

    /// No usable query could be pulled out of the synthesizer output.
    #[error("query synthesis failed: {0}")]
    QuerySynthesisFailed(String),

    /// The graph engine rejected or failed the candidate query.
    #[error("query {kind} error: {message}")]
    QueryExecution {
        kind: ExecutionFailure,
        message: String,
    },

    /// The completion provider could not be reached or returned nothing.
    #[error("language model unavailable: {0}")]
    LlmUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QaError {
    pub fn query_syntax(message: impl Into<String>) -> Self {
        QaError::QueryExecution {
            kind: ExecutionFailure::Syntax,
            message: message.into(),
        }
    }

    pub fn query_runtime(message: impl Into<String>) -> Self {
        QaError::QueryExecution {
            kind: ExecutionFailure::Runtime,
            message: message.into(),
        }
    }

    /// Stable identifier for logs and the `Reply` boundary.
    pub fn code(&self) -> &'static str {
        match self {
            QaError::UnsupportedIntent { .. } => "unsupported_intent",
            QaError::QuerySynthesisFailed(_) => "query_synthesis_failed",
            QaError::QueryExecution {
                kind: ExecutionFailure::Syntax,
                ..
            } => "query_syntax_error",
            QaError::QueryExecution {
                kind: ExecutionFailure::Runtime,
                ..
            } => "query_runtime_error",
            QaError::LlmUnavailable(_) => "llm_unavailable",
            QaError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether the orchestrator may loop back to synthesis once.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, QaError::QueryExecution { .. })
    }

    /// The text shown to the person who asked the question.
    pub fn user_message(&self) -> &'static str {
        match self {
            QaError::UnsupportedIntent { .. } => {
                "I can't handle that kind of question yet. Try asking about a movie, \
                 a director, an actor or a genre."
            }
            QaError::LlmUnavailable(_) => {
                "I'm sorry, the language model is unavailable right now. Please try again later."
            }
            _ => "I'm sorry, I encountered an error while processing your question. Please try again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_execution_kind() {
        assert_eq!(QaError::query_syntax("bad").code(), "query_syntax_error");
        assert_eq!(QaError::query_runtime("slow").code(), "query_runtime_error");
        assert!(QaError::query_syntax("bad").is_execution_error());
        assert!(!QaError::QuerySynthesisFailed("x".into()).is_execution_error());
    }

    #[test]
    fn unsupported_intent_has_its_own_user_message() {
        let err = QaError::UnsupportedIntent {
            intent: "unknown".into(),
            reason: "no template".into(),
        };
        assert!(err.user_message().starts_with("I can't handle"));
        assert!(QaError::query_runtime("x").user_message().starts_with("I'm sorry"));
    }
}
