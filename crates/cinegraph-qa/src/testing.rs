//! In-process doubles for the completion and graph interfaces.
//!
//! Both replay a queue of canned replies and record what they were asked, so
//! tests can assert on call counts and submitted queries.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::graph::{GraphEngine, GraphError, GraphRows, Params};
use crate::llm::{
    CompletionProvider, CompletionRequest, CompletionResponse, FinishReason, LlmError, ModelInfo,
    Usage,
};

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Fail(String),
}

/// Replays queued completions in order; an exhausted script is an API error.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Scripted::Fail(message.into()));
        self
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().push_back(Scripted::Text(text.into()));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().pop_front();
        match next {
            Some(Scripted::Text(content)) => Ok(CompletionResponse {
                content,
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
                model: "scripted".into(),
            }),
            Some(Scripted::Fail(message)) => Err(LlmError::Network(message)),
            None => Err(LlmError::Api("no scripted completion left".into())),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted".into(),
            provider: "test".into(),
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Replays queued results for `run` and `validate` separately.
///
/// An empty run queue yields zero rows; an empty validation queue accepts.
#[derive(Default)]
pub struct ScriptedGraph {
    runs: Mutex<VecDeque<Result<GraphRows, GraphError>>>,
    validations: Mutex<VecDeque<Result<(), GraphError>>>,
    executed: Mutex<Vec<(String, Params)>>,
    validated: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, rows: GraphRows) -> Self {
        self.runs.lock().push_back(Ok(rows));
        self
    }

    pub fn with_run_error(self, err: GraphError) -> Self {
        self.runs.lock().push_back(Err(err));
        self
    }

    pub fn with_rejection(self, err: GraphError) -> Self {
        self.validations.lock().push_back(Err(err));
        self
    }

    pub fn with_acceptance(self) -> Self {
        self.validations.lock().push_back(Ok(()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queries that reached `run`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(q, _)| q.clone()).collect()
    }

    pub fn executed_with_params(&self) -> Vec<(String, Params)> {
        self.executed.lock().clone()
    }

    /// Queries that were validated, in order.
    pub fn validated(&self) -> Vec<String> {
        self.validated.lock().clone()
    }
}

#[async_trait]
impl GraphEngine for ScriptedGraph {
    async fn run(&self, query: &str, params: &Params) -> Result<GraphRows, GraphError> {
        self.executed.lock().push((query.to_string(), params.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.runs.lock().pop_front();
        next.unwrap_or_else(|| Ok(GraphRows::default()))
    }

    async fn validate(&self, query: &str, _params: &Params) -> Result<(), GraphError> {
        self.validated.lock().push(query.to_string());
        let next = self.validations.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
