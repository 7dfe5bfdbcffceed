//! # CineGraph QA
//!
//! Natural-language question answering over a movie knowledge graph.
//!
//! ```text
//!  question
//!     │
//!     ▼
//!  ┌───────────┐   intent + entities   ┌─────────────┐   Cypher   ┌──────────┐
//!  │ Extractor │ ────────────────────▶ │ Synthesizer │ ─────────▶ │ Executor │
//!  └───────────┘                       └─────────────┘            └──────────┘
//!   llm | pattern                       template | llm                 │ rows
//!                                             ▲    retry once          │
//!                                             └────────────────────────┤
//!                                                                      ▼
//!                                                              ┌────────────┐
//!                                                    answer ◀──│  Answerer  │
//!                                                              └────────────┘
//!                                                               llm | template
//! ```
//!
//! The graph engine and the language model are reached only through
//! [`graph::GraphEngine`] and [`llm::CompletionProvider`]; everything else is
//! in-process and per request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cinegraph_qa::{Mode, QaService};
//! use cinegraph_qa::graph::neo4j::Neo4jHttpEngine;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(Neo4jHttpEngine::from_env()?);
//! let service = QaService::builder(engine).build();
//! let reply = service.respond("What movies did Christopher Nolan direct?", Mode::Direct).await;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod graph;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod result;
pub mod schema;
pub mod synthesizer;
pub mod testing;

pub use answer::{Answer, AnswerSource, NO_INFORMATION};
pub use config::{GraphConfig, LlmConfig, Provider, QaConfig};
pub use error::{ExecutionFailure, QaError, Result};
pub use intent::{Intent, ParseOutcome, StructuredQueryIntent};
pub use pipeline::{Mode, QaService, Reply, Stage};
pub use result::{ResultSet, ResultValue, Row};
pub use schema::SchemaDescriptor;
pub use synthesizer::{CandidateQuery, QueryValidity};
