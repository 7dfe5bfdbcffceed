//! Neo4j over the HTTP transactional endpoint.
//!
//! Each `run` is one auto-commit transaction:
//! `POST {url}/db/{database}/tx/commit` with `row` and `graph` result
//! contents, so node labels and relationship types survive decoding.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{GraphEngine, GraphError, GraphNode, GraphRelationship, GraphRows, GraphValue, Params};
use crate::config::{ConfigError, GraphConfig};

pub struct Neo4jHttpEngine {
    client: Client,
    endpoint: String,
    config: GraphConfig,
}

impl Neo4jHttpEngine {
    pub fn new(config: GraphConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;
        let endpoint = format!(
            "{}/db/{}/tx/commit",
            config.url.trim_end_matches('/'),
            config.database
        );
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(GraphConfig::from_env()?)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphEngine for Neo4jHttpEngine {
    async fn run(&self, query: &str, params: &Params) -> Result<GraphRows, GraphError> {
        let body = serde_json::json!({
            "statements": [{
                "statement": query,
                "parameters": params,
                "resultDataContents": ["row", "graph"],
            }]
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(password) = &self.config.password {
            request = request.basic_auth(&self.config.user, Some(password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GraphError::Runtime(format!("query timed out: {e}"))
            } else {
                GraphError::Unavailable(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GraphError::Unavailable(format!(
                    "authentication failed for user `{}`",
                    self.config.user
                )));
            }
            status if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(GraphError::Unavailable(format!("{status}: {}", text.trim())));
            }
            _ => {}
        }

        let payload: TxResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Runtime(format!("undecodable response: {e}")))?;
        decode_response(payload)
    }

    fn name(&self) -> &str {
        "neo4j-http"
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<serde_json::Value>,
    #[serde(default)]
    meta: Vec<serde_json::Value>,
    #[serde(default)]
    graph: Option<TxGraph>,
}

#[derive(Debug, Default, Deserialize)]
struct TxGraph {
    #[serde(default)]
    nodes: Vec<TxGraphNode>,
    #[serde(default)]
    relationships: Vec<TxGraphRel>,
}

#[derive(Debug, Deserialize)]
struct TxGraphNode {
    id: serde_json::Value,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TxGraphRel {
    id: serde_json::Value,
    #[serde(rename = "type")]
    rel_type: String,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    #[serde(default)]
    message: String,
}

fn classify(error: &TxError) -> GraphError {
    const COMPILE_TIME: [&str; 4] = [
        "Statement.SyntaxError",
        "Statement.SemanticError",
        "Statement.ParameterMissing",
        "Statement.InvalidSyntax",
    ];
    let text = format!("{}: {}", error.code, error.message);
    if COMPILE_TIME.iter().any(|c| error.code.ends_with(c)) {
        GraphError::Syntax(text)
    } else if error.code.starts_with("Neo.ClientError.Security") {
        GraphError::Unavailable(text)
    } else {
        GraphError::Runtime(text)
    }
}

fn decode_response(payload: TxResponse) -> Result<GraphRows, GraphError> {
    if let Some(err) = payload.errors.first() {
        return Err(classify(err));
    }
    let Some(result) = payload.results.into_iter().next() else {
        return Ok(GraphRows::default());
    };

    let mut rows = GraphRows::new(result.columns);
    for data in result.data {
        let index = GraphIndex::new(data.graph.unwrap_or_default());
        let row = data
            .row
            .iter()
            .enumerate()
            .map(|(i, value)| decode_value(value, data.meta.get(i), &index))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Labels and relationship types by id, from the `graph` result content.
struct GraphIndex {
    labels: HashMap<String, Vec<String>>,
    rel_types: HashMap<String, String>,
}

impl GraphIndex {
    fn new(graph: TxGraph) -> Self {
        Self {
            labels: graph
                .nodes
                .into_iter()
                .map(|n| (id_key(&n.id), n.labels))
                .collect(),
            rel_types: graph
                .relationships
                .into_iter()
                .map(|r| (id_key(&r.id), r.rel_type))
                .collect(),
        }
    }
}

fn id_key(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn meta_kind(meta: &serde_json::Value) -> Option<&str> {
    meta.get("type").and_then(|t| t.as_str())
}

fn properties(value: &serde_json::Value) -> BTreeMap<String, GraphValue> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), GraphValue::from_json(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_node(value: &serde_json::Value, meta: &serde_json::Value, index: &GraphIndex) -> GraphNode {
    let id = meta.get("id").map(id_key);
    let labels = id
        .as_ref()
        .and_then(|id| index.labels.get(id).cloned())
        .unwrap_or_default();
    GraphNode {
        id,
        labels,
        properties: properties(value),
    }
}

fn decode_relationship(
    value: &serde_json::Value,
    meta: &serde_json::Value,
    index: &GraphIndex,
) -> GraphRelationship {
    let id = meta.get("id").map(id_key);
    let rel_type = id
        .as_ref()
        .and_then(|id| index.rel_types.get(id).cloned())
        .unwrap_or_default();
    GraphRelationship {
        id,
        rel_type,
        properties: properties(value),
    }
}

fn decode_value(
    value: &serde_json::Value,
    meta: Option<&serde_json::Value>,
    index: &GraphIndex,
) -> GraphValue {
    let Some(meta) = meta.filter(|m| !m.is_null()) else {
        return GraphValue::from_json(value);
    };

    match meta_kind(meta) {
        Some("node") => return GraphValue::Node(decode_node(value, meta, index)),
        Some("relationship") => {
            return GraphValue::Relationship(decode_relationship(value, meta, index))
        }
        _ => {}
    }

    let (Some(items), Some(metas)) = (value.as_array(), meta.as_array()) else {
        return GraphValue::from_json(value);
    };

    if is_path(metas) {
        let mut nodes = Vec::new();
        let mut relationships = Vec::new();
        for (item, m) in items.iter().zip(metas) {
            match meta_kind(m) {
                Some("node") => nodes.push(decode_node(item, m, index)),
                _ => relationships.push(decode_relationship(item, m, index)),
            }
        }
        return GraphValue::Path {
            nodes,
            relationships,
        };
    }

    GraphValue::List(
        items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_value(item, metas.get(i), index))
            .collect(),
    )
}

/// Node, relationship, node, ... with at least one hop.
fn is_path(metas: &[serde_json::Value]) -> bool {
    metas.len() >= 3
        && metas.len() % 2 == 1
        && metas.iter().enumerate().all(|(i, m)| {
            let expected = if i % 2 == 0 { "node" } else { "relationship" };
            meta_kind(m) == Some(expected)
        })
}
