//! Schema descriptor for the movie graph.
//!
//! The descriptor is prompt context only: it is built once, shared behind an
//! `Arc`, and never mutated while the process runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Semantic type of a node property, as rendered into prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Float,
}

impl PropertyType {
    fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    pub ty: PropertyType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabel {
    pub name: String,
    pub properties: Vec<PropertySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub name: String,
    pub source: String,
    pub target: String,
    pub directed: bool,
}

/// Labels, relationship types and properties available in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    labels: Vec<NodeLabel>,
    relationships: Vec<RelationshipType>,
}

impl SchemaDescriptor {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// The IMDB Top-250 movie graph.
    pub fn movie_graph() -> Self {
        use PropertyType::*;
        Self::builder()
            .label(
                "Movie",
                &[
                    ("id", Integer),
                    ("name", String),
                    ("year", Integer),
                    ("rating", Float),
                    ("certificate", String),
                    ("run_time", String),
                    ("tagline", String),
                    ("budget", String),
                    ("box_office", String),
                ],
            )
            .label("Person", &[("name", String)])
            .label("Genre", &[("name", String)])
            .relationship("DIRECTED", "Person", "Movie")
            .relationship("ACTED_IN", "Person", "Movie")
            .relationship("WROTE", "Person", "Movie")
            .relationship("BELONGS_TO", "Movie", "Genre")
            .build()
    }

    pub fn labels(&self) -> &[NodeLabel] {
        &self.labels
    }

    pub fn relationships(&self) -> &[RelationshipType] {
        &self.relationships
    }

    pub fn label(&self, name: &str) -> Option<&NodeLabel> {
        self.labels.iter().find(|l| l.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipType> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Deterministic, LLM-readable rendering of the schema.
    pub fn describe(&self) -> String {
        let mut out = String::from("Nodes:\n");
        for label in &self.labels {
            let props = label
                .properties
                .iter()
                .map(|p| format!("{}: {}", p.name, p.ty.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "- {} (properties: {})", label.name, props);
        }
        out.push_str("\nRelationships:\n");
        for rel in &self.relationships {
            let arrow = if rel.directed { "->" } else { "-" };
            let _ = writeln!(
                out,
                "- ({})-[:{}]{}({})",
                rel.source, rel.name, arrow, rel.target
            );
        }
        out
    }

    /// Labels and relationship types a query mentions that the schema lacks.
    ///
    /// Only `:Name` tokens outside string literals are considered; this is a
    /// diagnostic, not a validator.
    pub fn unknown_identifiers(&self, query: &str) -> Vec<String> {
        let mut unknown = BTreeSet::new();
        for ident in colon_identifiers(query) {
            if self.label(&ident).is_none() && self.relationship(&ident).is_none() {
                unknown.insert(ident);
            }
        }
        unknown.into_iter().collect()
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::movie_graph()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    labels: Vec<NodeLabel>,
    relationships: Vec<RelationshipType>,
}

impl SchemaBuilder {
    pub fn label(mut self, name: &str, properties: &[(&str, PropertyType)]) -> Self {
        self.labels.push(NodeLabel {
            name: name.to_string(),
            properties: properties
                .iter()
                .map(|(n, ty)| PropertySpec {
                    name: n.to_string(),
                    ty: *ty,
                })
                .collect(),
        });
        self
    }

    pub fn relationship(mut self, name: &str, source: &str, target: &str) -> Self {
        self.relationships.push(RelationshipType {
            name: name.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            directed: true,
        });
        self
    }

    pub fn build(self) -> SchemaDescriptor {
        SchemaDescriptor {
            labels: self.labels,
            relationships: self.relationships,
        }
    }
}

/// `:Ident` tokens outside quotes, e.g. `(p:Person)-[:DIRECTED]->`.
fn colon_identifiers(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = query.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if let Some(q) = quote {
            if ch == '\\' {
                chars.next();
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            ':' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // `{name: $x}` map keys are followed by a value, not an identifier.
                if ident.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                    out.push(ident);
                }
            }
            _ => {}
        }
    }
    out
}
