//! Graph execution interface.
//!
//! An engine takes a parameterized Cypher string and returns rows of
//! engine-native values. Flattening those values into plain scalars is the
//! executor's job, not the engine's.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::QaError;

#[cfg(feature = "neo4j-http")]
pub mod neo4j;

/// Named query parameters (`$param1`, `$name`, ...).
pub type Params = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Engine-internal id; never shown to users.
    pub id: Option<String>,
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, GraphValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelationship {
    pub id: Option<String>,
    pub rel_type: String,
    pub properties: BTreeMap<String, GraphValue>,
}

/// A value as the engine hands it back.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    Map(BTreeMap<String, GraphValue>),
    Node(GraphNode),
    Relationship(GraphRelationship),
    Path {
        nodes: Vec<GraphNode>,
        relationships: Vec<GraphRelationship>,
    },
}

impl GraphValue {
    /// Plain JSON into graph values; objects become maps.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => GraphValue::Null,
            serde_json::Value::Bool(b) => GraphValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => GraphValue::Int(i),
                None => GraphValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => GraphValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                GraphValue::List(items.iter().map(GraphValue::from_json).collect())
            }
            serde_json::Value::Object(map) => GraphValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), GraphValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for GraphValue {
    fn from(s: &str) -> Self {
        GraphValue::String(s.to_string())
    }
}

impl From<i64> for GraphValue {
    fn from(i: i64) -> Self {
        GraphValue::Int(i)
    }
}

impl From<i32> for GraphValue {
    fn from(i: i32) -> Self {
        GraphValue::Int(i64::from(i))
    }
}

impl From<f64> for GraphValue {
    fn from(x: f64) -> Self {
        GraphValue::Float(x)
    }
}

/// Rows in engine order, each aligned with `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<GraphValue>>,
}

impl GraphRows {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<GraphValue>) {
        self.rows.push(row);
    }

    pub fn with_row(mut self, row: Vec<GraphValue>) -> Self {
        self.rows.push(row);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// The engine refused to compile the statement.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// The statement compiled but failed at run time.
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("graph engine unavailable: {0}")]
    Unavailable(String),
}

impl From<GraphError> for QaError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Syntax(msg) => QaError::query_syntax(msg),
            GraphError::Runtime(msg) => QaError::query_runtime(msg),
            GraphError::Unavailable(msg) => {
                QaError::query_runtime(format!("graph engine unavailable: {msg}"))
            }
        }
    }
}

#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn run(&self, query: &str, params: &Params) -> Result<GraphRows, GraphError>;

    /// Ask the engine to plan the query without running it.
    async fn validate(&self, query: &str, params: &Params) -> Result<(), GraphError> {
        let trimmed = query.trim_start();
        if starts_with_keyword(trimmed, "EXPLAIN") {
            return self.run(trimmed, params).await.map(|_| ());
        }
        self.run(&format!("EXPLAIN {trimmed}"), params)
            .await
            .map(|_| ())
    }

    fn name(&self) -> &str;
}

pub(crate) fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    let (Some(head), Some(rest)) = (text.get(..keyword.len()), text.get(keyword.len()..)) else {
        return false;
    };
    head.eq_ignore_ascii_case(keyword)
        && rest
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
}
