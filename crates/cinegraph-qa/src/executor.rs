//! Validate, run and normalize candidate queries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QaError, Result};
use crate::graph::{GraphEngine, GraphError, GraphNode, GraphRows, GraphValue};
use crate::result::{ResultSet, ResultValue, Row};
use crate::synthesizer::CandidateQuery;

/// How an execution ended.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success(ResultSet),
    /// Ran fine, matched nothing. Columns are kept.
    Empty(ResultSet),
    Error(QaError),
}

impl ExecutionOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, ExecutionOutcome::Empty(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success(_) => "success",
            ExecutionOutcome::Empty(_) => "empty",
            ExecutionOutcome::Error(_) => "error",
        }
    }

    pub fn into_result(self) -> Result<ResultSet> {
        match self {
            ExecutionOutcome::Success(rs) | ExecutionOutcome::Empty(rs) => Ok(rs),
            ExecutionOutcome::Error(err) => Err(err),
        }
    }
}

pub struct QueryExecutor {
    engine: Arc<dyn GraphEngine>,
    timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn GraphEngine>) -> Self {
        Self {
            engine,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Compile the query on the engine, then run it.
    ///
    /// The candidate's validity is updated in place; a query that is already
    /// rejected is refused without contacting the engine.
    pub async fn execute(&self, query: &mut CandidateQuery) -> ExecutionOutcome {
        match self.try_execute(query).await {
            Ok(rs) if rs.is_empty() => ExecutionOutcome::Empty(rs),
            Ok(rs) => ExecutionOutcome::Success(rs),
            Err(err) => ExecutionOutcome::Error(err),
        }
    }

    async fn try_execute(&self, query: &mut CandidateQuery) -> Result<ResultSet> {
        if let crate::synthesizer::QueryValidity::Rejected(reason) = &query.validity {
            return Err(QaError::query_syntax(format!(
                "query was already rejected: {reason}"
            )));
        }

        if !query.is_accepted() {
            let validation = self
                .bounded("validation", self.engine.validate(&query.text, &query.parameters))
                .await;
            if let Err(err) = validation {
                query.mark_rejected(err.to_string());
                tracing::warn!(engine = self.engine.name(), error = %err, "query rejected at validation");
                return Err(err.into());
            }
            query.mark_accepted();
        }

        let rows = self
            .bounded("execution", self.engine.run(&query.text, &query.parameters))
            .await
            .map_err(QaError::from)?;
        let result = normalize_rows(rows);
        tracing::debug!(rows = result.len(), "query executed");
        Ok(result)
    }

    async fn bounded<T>(
        &self,
        phase: &str,
        call: impl Future<Output = std::result::Result<T, GraphError>>,
    ) -> std::result::Result<T, GraphError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GraphError::Runtime(format!(
                    "{phase} timed out after {}s",
                    limit.as_secs_f32()
                ))
            })?,
            None => call.await,
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

pub fn normalize_rows(rows: GraphRows) -> ResultSet {
    let GraphRows { columns, rows } = rows;
    let normalized = rows
        .into_iter()
        .map(|values| {
            let mut row = Row::new();
            for (column, value) in columns.iter().zip(values) {
                row.insert(column, normalize_value(value));
            }
            row
        })
        .collect();
    ResultSet::new(columns, normalized)
}

/// Flatten an engine value into plain data.
///
/// Nodes become their display name, relationships their type, paths the list
/// of node names and maps a stable `key: value` string.
pub fn normalize_value(value: GraphValue) -> ResultValue {
    match value {
        GraphValue::Null => ResultValue::Null,
        GraphValue::Bool(b) => ResultValue::Bool(b),
        GraphValue::Int(i) => ResultValue::Int(i),
        GraphValue::Float(x) => ResultValue::Float(x),
        GraphValue::String(s) => ResultValue::Text(s),
        GraphValue::List(items) => {
            ResultValue::List(items.into_iter().map(normalize_value).collect())
        }
        GraphValue::Map(map) => {
            let parts: Vec<String> = map
                .into_iter()
                .map(|(k, v)| format!("{k}: {}", normalize_value(v)))
                .collect();
            ResultValue::Text(parts.join(", "))
        }
        GraphValue::Node(node) => ResultValue::Text(node_display(node)),
        GraphValue::Relationship(rel) => ResultValue::Text(rel.rel_type),
        GraphValue::Path { nodes, .. } => ResultValue::List(
            nodes
                .into_iter()
                .map(|n| ResultValue::Text(node_display(n)))
                .collect(),
        ),
    }
}

fn node_display(mut node: GraphNode) -> String {
    for key in ["name", "title"] {
        if let Some(value) = node.properties.remove(key) {
            if !matches!(value, GraphValue::Null) {
                return normalize_value(value).to_string();
            }
        }
    }
    node.labels
        .into_iter()
        .next()
        .unwrap_or_else(|| "node".to_string())
}
