//! Structured representation of a question.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of what a question is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    MovieSearch,
    MovieInfo,
    PersonInfo,
    Comparison,
    Statistics,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::MovieSearch,
        Intent::MovieInfo,
        Intent::PersonInfo,
        Intent::Comparison,
        Intent::Statistics,
        Intent::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::MovieSearch => "movie_search",
            Intent::MovieInfo => "movie_info",
            Intent::PersonInfo => "person_info",
            Intent::Comparison => "comparison",
            Intent::Statistics => "statistics",
            Intent::Unknown => "unknown",
        }
    }

    /// Lenient tag lookup; anything unrecognised is `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        let norm = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == norm)
            .unwrap_or(Intent::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity roles the extractors and templates agree on.
pub mod roles {
    pub const DIRECTOR: &str = "director";
    pub const ACTOR: &str = "actor";
    pub const WRITER: &str = "writer";
    pub const PERSON: &str = "person";
    pub const MOVIE_TITLE: &str = "movie_title";
    pub const GENRE: &str = "genre";
    pub const YEAR: &str = "year";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub role: String,
    pub value: String,
}

/// Intent plus the entities pulled out of one question.
///
/// Roles may repeat (a comparison names two movies) and need not cover the
/// whole question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQueryIntent {
    pub intent: Intent,
    pub entities: Vec<Entity>,
    pub raw_question: String,
}

impl StructuredQueryIntent {
    pub fn new(intent: Intent, raw_question: impl Into<String>) -> Self {
        Self {
            intent,
            entities: Vec::new(),
            raw_question: raw_question.into(),
        }
    }

    pub fn unknown(raw_question: impl Into<String>) -> Self {
        Self::new(Intent::Unknown, raw_question)
    }

    pub fn with_entity(mut self, role: &str, value: impl Into<String>) -> Self {
        self.push_entity(role, value);
        self
    }

    /// Adds an entity, dropping blank values and exact duplicates.
    pub fn push_entity(&mut self, role: &str, value: impl Into<String>) {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return;
        }
        let role = role.trim().to_ascii_lowercase();
        if self
            .entities
            .iter()
            .any(|e| e.role == role && e.value == value)
        {
            return;
        }
        self.entities.push(Entity { role, value });
    }

    pub fn first(&self, role: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| e.role == role)
            .map(|e| e.value.as_str())
    }

    pub fn all(&self, role: &str) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.role == role)
            .map(|e| e.value.as_str())
            .collect()
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == Intent::Unknown
    }
}

/// Outcome of best-effort parsing of a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(StructuredQueryIntent),
    Unparsed { reason: String },
}

impl ParseOutcome {
    /// Collapse to an intent; `Unparsed` becomes `unknown` with no entities.
    pub fn into_intent(self, raw_question: &str) -> StructuredQueryIntent {
        match self {
            ParseOutcome::Parsed(intent) => intent,
            ParseOutcome::Unparsed { .. } => StructuredQueryIntent::unknown(raw_question),
        }
    }
}
