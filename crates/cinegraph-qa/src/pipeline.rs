//! Per-request orchestration.
//!
//! ```text
//! Received → Extracting → Synthesizing → Executing → Answering → Done
//!                              ↑              │
//!                              └── once ──────┘  (engine rejected the query)
//!
//! Failed is reachable from every state.
//! ```
//!
//! Direct and LLM mode are the same [`Pipeline`] with different strategies
//! plugged in; [`QaService`] holds one of each and dispatches on [`Mode`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;
use uuid::Uuid;

use crate::answer::{Answer, AnswerSource, AnswerSynthesizer, LlmAnswerSynthesizer, TemplateAnswerSynthesizer};
use crate::config::QaConfig;
use crate::error::{QaError, Result};
use crate::executor::{ExecutionOutcome, QueryExecutor};
use crate::extractor::{IntentExtractor, LlmIntentExtractor, PatternIntentExtractor};
use crate::graph::GraphEngine;
use crate::intent::StructuredQueryIntent;
use crate::llm::CompletionProvider;
use crate::schema::SchemaDescriptor;
use crate::synthesizer::{
    CandidateQuery, LlmSynthesizer, PreviousAttempt, QuerySynthesizer, SynthesisRequest,
    TemplateSynthesizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Fixed templates, no query generation by the model.
    Direct,
    /// The model writes the query from the question and schema.
    Llm,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Direct => "direct",
            Mode::Llm => "llm",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "pattern" | "template" => Ok(Mode::Direct),
            "llm" | "llm-enhanced" | "enhanced" => Ok(Mode::Llm),
            other => Err(QaError::InvalidConfig(format!(
                "unknown mode {other:?} (expected direct|llm)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Extracting,
    Synthesizing,
    Executing,
    Answering,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Extracting => "extracting",
            Stage::Synthesizing => "synthesizing",
            Stage::Executing => "executing",
            Stage::Answering => "answering",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage: Stage,
    /// Time since the request was received.
    pub at: Duration,
    /// 1 on the first pass, 2 on the corrective pass.
    pub attempt: u32,
}

/// What happened to one request.
#[derive(Debug, Clone)]
pub struct PipelineTrace {
    pub request_id: Uuid,
    pub mode: Mode,
    pub events: Vec<StageEvent>,
    pub intent: Option<StructuredQueryIntent>,
    pub queries: Vec<CandidateQuery>,
    pub outcome: Option<&'static str>,
    pub failure: Option<&'static str>,
    started: Instant,
}

impl PipelineTrace {
    fn new(mode: Mode) -> Self {
        let mut trace = Self {
            request_id: Uuid::new_v4(),
            mode,
            events: Vec::new(),
            intent: None,
            queries: Vec::new(),
            outcome: None,
            failure: None,
            started: Instant::now(),
        };
        trace.enter(Stage::Received, 1);
        trace
    }

    fn enter(&mut self, stage: Stage, attempt: u32) {
        self.events.push(StageEvent {
            stage,
            at: self.started.elapsed(),
            attempt,
        });
        tracing::info!(stage = stage.as_str(), attempt, "stage");
    }

    pub fn stage(&self) -> Stage {
        self.events.last().map_or(Stage::Received, |e| e.stage)
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events.iter().map(|e| e.stage).collect()
    }

    pub fn synthesis_attempts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.stage == Stage::Synthesizing)
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.events.last().map_or(Duration::ZERO, |e| e.at)
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub result: Result<Answer>,
    pub trace: PipelineTrace,
}

/// Intent and query for a question, without touching the graph.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub mode: Mode,
    pub intent: Option<StructuredQueryIntent>,
    pub query: CandidateQuery,
}

pub struct Pipeline {
    mode: Mode,
    /// `None` hands the raw question straight to the synthesizer.
    extractor: Option<Arc<dyn IntentExtractor>>,
    synthesizer: Arc<dyn QuerySynthesizer>,
    executor: Arc<QueryExecutor>,
    answerer: Arc<dyn AnswerSynthesizer>,
    schema: Arc<SchemaDescriptor>,
}

impl Pipeline {
    pub fn new(
        mode: Mode,
        extractor: Option<Arc<dyn IntentExtractor>>,
        synthesizer: Arc<dyn QuerySynthesizer>,
        executor: Arc<QueryExecutor>,
        answerer: Arc<dyn AnswerSynthesizer>,
        schema: Arc<SchemaDescriptor>,
    ) -> Self {
        Self {
            mode,
            extractor,
            synthesizer,
            executor,
            answerer,
            schema,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Component names, for logs and `--verbose` output.
    pub fn describe(&self) -> String {
        format!(
            "mode={} extractor={} synthesizer={} engine={} answerer={}",
            self.mode,
            self.extractor.as_ref().map_or("skipped", |e| e.name()),
            self.synthesizer.name(),
            self.executor.engine_name(),
            self.answerer.name()
        )
    }

    pub async fn run(&self, question: &str) -> PipelineRun {
        let mut trace = PipelineTrace::new(self.mode);
        let span = tracing::info_span!(
            "qa_request",
            request_id = %trace.request_id,
            mode = %self.mode
        );

        let result = self
            .drive(question, &mut trace)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match &result {
            Ok(answer) => {
                trace.enter(Stage::Done, 1);
                tracing::info!(
                    source = answer.source.as_str(),
                    elapsed_ms = trace.elapsed().as_millis() as u64,
                    "request answered"
                );
            }
            Err(err) => {
                trace.failure = Some(err.code());
                trace.enter(Stage::Failed, 1);
                tracing::error!(code = err.code(), error = %err, "request failed");
            }
        }
        PipelineRun { result, trace }
    }

    async fn extract(
        &self,
        question: &str,
        trace: &mut PipelineTrace,
    ) -> Result<Option<StructuredQueryIntent>> {
        let Some(extractor) = &self.extractor else {
            return Ok(None);
        };
        trace.enter(Stage::Extracting, 1);
        let intent = extractor.extract(question).await?;
        tracing::info!(intent = %intent.intent, entities = intent.entities.len(), "intent extracted");
        trace.intent = Some(intent.clone());
        Ok(Some(intent))
    }

    async fn drive(&self, question: &str, trace: &mut PipelineTrace) -> Result<Answer> {
        let intent = self.extract(question, trace).await?;
        let base = SynthesisRequest {
            question,
            intent: intent.as_ref(),
            schema: &self.schema,
            previous: None,
        };

        trace.enter(Stage::Synthesizing, 1);
        let mut query = self.synthesizer.synthesize(base).await?;

        trace.enter(Stage::Executing, 1);
        let outcome = self.executor.execute(&mut query).await;
        trace.queries.push(query.clone());

        let results = match outcome {
            ExecutionOutcome::Error(err) if err.is_execution_error() => {
                tracing::warn!(code = err.code(), error = %err, "query failed; re-synthesizing once");
                let previous = PreviousAttempt {
                    query: query.text.clone(),
                    error: err.to_string(),
                };

                trace.enter(Stage::Synthesizing, 2);
                let mut retry = self
                    .synthesizer
                    .synthesize(base.with_previous(&previous))
                    .await?;
                if retry.same_as(&query) {
                    tracing::warn!("corrected query is identical to the rejected one; not resubmitting");
                    return Err(err);
                }

                trace.enter(Stage::Executing, 2);
                let outcome = self.executor.execute(&mut retry).await;
                trace.queries.push(retry);
                trace.outcome = Some(outcome.label());
                outcome.into_result()?
            }
            other => {
                trace.outcome = Some(other.label());
                other.into_result()?
            }
        };

        trace.enter(Stage::Answering, 1);
        self.answerer.synthesize(question, &results).await
    }

    /// Extract and synthesize only.
    pub async fn explain(&self, question: &str) -> Result<Explanation> {
        let mut trace = PipelineTrace::new(self.mode);
        let intent = self.extract(question, &mut trace).await?;
        let request = SynthesisRequest {
            question,
            intent: intent.as_ref(),
            schema: &self.schema,
            previous: None,
        };
        let query = self.synthesizer.synthesize(request).await?;
        Ok(Explanation {
            mode: self.mode,
            intent,
            query,
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// User-facing outcome of one turn. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: Option<AnswerSource>,
    pub failure_code: Option<&'static str>,
    pub request_id: Uuid,
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        self.failure_code.is_some()
    }
}

pub struct QaService {
    direct: Pipeline,
    llm: Option<Pipeline>,
    schema: Arc<SchemaDescriptor>,
}

impl QaService {
    pub fn builder(engine: Arc<dyn GraphEngine>) -> QaServiceBuilder {
        QaServiceBuilder::new(engine)
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn supports(&self, mode: Mode) -> bool {
        match mode {
            Mode::Direct => true,
            Mode::Llm => self.llm.is_some(),
        }
    }

    pub fn pipeline(&self, mode: Mode) -> Result<&Pipeline> {
        match mode {
            Mode::Direct => Ok(&self.direct),
            Mode::Llm => self.llm.as_ref().ok_or_else(|| {
                QaError::LlmUnavailable("no completion provider is configured".into())
            }),
        }
    }

    /// One user turn.
    pub async fn answer(&self, question: &str, mode: Mode) -> Result<Answer> {
        self.run(question, mode).await.result
    }

    /// Like [`answer`](Self::answer), with the trace kept.
    pub async fn run(&self, question: &str, mode: Mode) -> PipelineRun {
        match self.pipeline(mode) {
            Ok(pipeline) => pipeline.run(question).await,
            Err(err) => {
                let mut trace = PipelineTrace::new(mode);
                trace.failure = Some(err.code());
                trace.enter(Stage::Failed, 1);
                PipelineRun {
                    result: Err(err),
                    trace,
                }
            }
        }
    }

    /// [`answer`](Self::answer) mapped to display text plus a failure code.
    pub async fn respond(&self, question: &str, mode: Mode) -> Reply {
        let run = self.run(question, mode).await;
        match run.result {
            Ok(answer) => Reply {
                text: answer.text,
                source: Some(answer.source),
                failure_code: None,
                request_id: run.trace.request_id,
            },
            Err(err) => Reply {
                text: err.user_message().to_string(),
                source: None,
                failure_code: Some(err.code()),
                request_id: run.trace.request_id,
            },
        }
    }

    pub async fn explain(&self, question: &str, mode: Mode) -> Result<Explanation> {
        self.pipeline(mode)?.explain(question).await
    }
}

pub struct QaServiceBuilder {
    engine: Arc<dyn GraphEngine>,
    provider: Option<Arc<dyn CompletionProvider>>,
    config: QaConfig,
    schema: Arc<SchemaDescriptor>,
}

impl QaServiceBuilder {
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self {
            engine,
            provider: None,
            config: QaConfig::default(),
            schema: Arc::new(SchemaDescriptor::movie_graph()),
        }
    }

    /// Enables LLM mode, LLM extraction and LLM answers.
    pub fn completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: QaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(mut self, schema: Arc<SchemaDescriptor>) -> Self {
        self.schema = schema;
        self
    }

    pub fn build(self) -> QaService {
        let cfg = &self.config;
        let executor = Arc::new(
            QueryExecutor::new(self.engine.clone()).with_timeout(cfg.timeouts.execution),
        );
        let template_answers = TemplateAnswerSynthesizer::new(cfg.max_answer_rows);

        let direct_extractor: Arc<dyn IntentExtractor>;
        let answerer: Arc<dyn AnswerSynthesizer>;
        match &self.provider {
            Some(provider) => {
                direct_extractor = Arc::new(self.llm_extractor(provider.clone()));
                answerer = Arc::new(
                    LlmAnswerSynthesizer::new(provider.clone())
                        .with_options(cfg.answer_options)
                        .with_timeout(cfg.timeouts.answering)
                        .with_max_prompt_rows(cfg.max_prompt_rows)
                        .with_strict_grounding(cfg.strict_grounding)
                        .with_fallback(template_answers),
                );
            }
            None => {
                direct_extractor = Arc::new(PatternIntentExtractor::new());
                answerer = Arc::new(template_answers);
            }
        }

        let direct = Pipeline::new(
            Mode::Direct,
            Some(direct_extractor.clone()),
            Arc::new(TemplateSynthesizer::new()),
            executor.clone(),
            answerer.clone(),
            self.schema.clone(),
        );

        let llm = self.provider.as_ref().map(|provider| {
            let extractor = if cfg.skip_extraction_in_llm_mode {
                None
            } else {
                Some(direct_extractor.clone())
            };
            Pipeline::new(
                Mode::Llm,
                extractor,
                Arc::new(
                    LlmSynthesizer::new(provider.clone())
                        .with_options(cfg.synthesis_options)
                        .with_timeout(cfg.timeouts.synthesis),
                ),
                executor.clone(),
                answerer.clone(),
                self.schema.clone(),
            )
        });

        tracing::debug!(direct = %direct.describe(), llm = ?llm.as_ref().map(Pipeline::describe), "qa service built");
        QaService {
            direct,
            llm,
            schema: self.schema,
        }
    }

    fn llm_extractor(&self, provider: Arc<dyn CompletionProvider>) -> LlmIntentExtractor {
        LlmIntentExtractor::new(provider)
            .with_options(self.config.extraction_options)
            .with_timeout(self.config.timeouts.extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_leniently() {
        assert_eq!("Direct".parse::<Mode>().unwrap(), Mode::Direct);
        assert_eq!("llm-enhanced".parse::<Mode>().unwrap(), Mode::Llm);
        assert_eq!("magic".parse::<Mode>().unwrap_err().code(), "invalid_config");
    }

    #[test]
    fn trace_starts_received() {
        let trace = PipelineTrace::new(Mode::Direct);
        assert_eq!(trace.stage(), Stage::Received);
        assert!(!trace.stage().is_terminal());
        assert_eq!(trace.synthesis_attempts(), 0);
    }
}
