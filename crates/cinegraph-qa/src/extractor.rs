//! Question → intent + entities.
//!
//! [`LlmIntentExtractor`] makes one completion call with a few-shot prompt and
//! parses the reply defensively. [`PatternIntentExtractor`] matches a fixed set
//! of question shapes and needs no model at all.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::intent::{roles, Intent, ParseOutcome, StructuredQueryIntent};
use crate::llm::{
    complete_text, parse_llm_json_object, CompletionOptions, CompletionProvider, CompletionRequest,
};

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// Never fails on unparseable input; only transport failures surface.
    async fn extract(&self, question: &str) -> Result<StructuredQueryIntent>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// LLM extraction
// ============================================================================

const EXTRACTION_PROMPT: &str = r#"Analyze the question about movies and extract its intent and entities.

Respond with a single JSON object:
{"intent": "<tag>", "entities": {"<role>": "<value>" or ["<value>", ...]}}

Intent tags:
- movie_search: find movies by person, genre or year
- movie_info: details about one movie
- person_info: what a person directed, acted in or wrote
- comparison: compare two or more movies
- statistics: rankings, counts, averages
- unknown: anything else

Entity roles: director, actor, writer, person, movie_title, genre, year.
Copy names exactly as written in the question.

Examples:
Question: What movies did Christopher Nolan direct?
{"intent": "person_info", "entities": {"director": "Christopher Nolan"}}

Question: Tell me about the movie The Godfather
{"intent": "movie_info", "entities": {"movie_title": "The Godfather"}}

Question: Show me the best crime movies from 1994
{"intent": "movie_search", "entities": {"genre": "crime", "year": "1994"}}

Question: Compare Heat and Ronin
{"intent": "comparison", "entities": {"movie_title": ["Heat", "Ronin"]}}

Question: Which movies featured Tom Hanks?
{"intent": "person_info", "entities": {"actor": "Tom Hanks"}}

Question: What are the highest rated movies?
{"intent": "statistics", "entities": {}}

Question: What's the weather today?
{"intent": "unknown", "entities": {}}"#;

pub struct LlmIntentExtractor {
    provider: Arc<dyn CompletionProvider>,
    options: CompletionOptions,
    timeout: Option<Duration>,
}

impl LlmIntentExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            options: CompletionOptions::new(300, 0.0),
            timeout: None,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_request(&self, question: &str) -> CompletionRequest {
        CompletionRequest::new(
            EXTRACTION_PROMPT,
            format!("Question: {}", question.trim()),
            self.options,
        )
        .json()
    }
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    async fn extract(&self, question: &str) -> Result<StructuredQueryIntent> {
        let completion =
            complete_text(self.provider.as_ref(), self.build_request(question), self.timeout)
                .await?;

        let outcome = parse_extraction(&completion, question);
        if let ParseOutcome::Unparsed { reason } = &outcome {
            tracing::warn!(%reason, "extraction unparseable; treating question as unknown");
        }
        Ok(outcome.into_intent(question))
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// Parse an extraction completion.
///
/// Accepts `intent` or `primary_intent`, entity maps whose values are strings,
/// numbers or lists of those, and entity lists of `{role, value}` objects.
/// Unrecognised intent tags parse as `unknown`.
pub fn parse_extraction(completion: &str, question: &str) -> ParseOutcome {
    let value: Value = match parse_llm_json_object(completion) {
        Ok(v) => v,
        Err(reason) => return ParseOutcome::Unparsed { reason },
    };
    let Some(obj) = value.as_object() else {
        return ParseOutcome::Unparsed {
            reason: "completion is not a JSON object".into(),
        };
    };

    let tag = match obj.get("intent").or_else(|| obj.get("primary_intent")) {
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Null) => "unknown",
        Some(_) => {
            return ParseOutcome::Unparsed {
                reason: "intent is not a string".into(),
            }
        }
        None => {
            return ParseOutcome::Unparsed {
                reason: "missing intent field".into(),
            }
        }
    };

    let intent = Intent::from_tag(tag);
    if intent == Intent::Unknown && !tag.trim().eq_ignore_ascii_case("unknown") {
        tracing::debug!(tag, "unrecognised intent tag");
    }

    let mut parsed = StructuredQueryIntent::new(intent, question);
    match obj.get("entities") {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let role = canonical_role(key);
                for text in entity_values(value) {
                    parsed.push_entity(&role, text);
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                let role = item.get("role").or_else(|| item.get("type")).and_then(Value::as_str);
                if let (Some(role), Some(value)) = (role, item.get("value")) {
                    let role = canonical_role(role);
                    for text in entity_values(value) {
                        parsed.push_entity(&role, text);
                    }
                }
            }
        }
        _ => {}
    }
    ParseOutcome::Parsed(parsed)
}

fn entity_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(entity_values).collect(),
        _ => Vec::new(),
    }
}

/// Singular role names for the plural/synonym keys models tend to use.
fn canonical_role(key: &str) -> String {
    let key = key.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    let role = match key.as_str() {
        "director" | "directors" => roles::DIRECTOR,
        "actor" | "actors" | "actress" | "cast" | "star" | "stars" => roles::ACTOR,
        "writer" | "writers" | "screenwriter" => roles::WRITER,
        "person" | "people" | "persons" | "name" | "names" => roles::PERSON,
        "movie" | "movies" | "movie_title" | "movie_titles" | "title" | "titles" | "film"
        | "films" => roles::MOVIE_TITLE,
        "genre" | "genres" => roles::GENRE,
        "year" | "years" => roles::YEAR,
        _ => return key,
    };
    role.to_string()
}

// ============================================================================
// Pattern extraction
// ============================================================================

struct QuestionPattern {
    intent: Intent,
    /// Role for each capture group, in order.
    roles: &'static [&'static str],
    regex: Regex,
}

/// Regular-expression question shapes, tried in order; first match wins.
pub struct PatternIntentExtractor {
    patterns: Vec<QuestionPattern>,
}

const PATTERNS: &[(Intent, &[&str], &str)] = &[
    (Intent::PersonInfo, &[roles::DIRECTOR], r"what movies did (.+) direct"),
    (Intent::PersonInfo, &[roles::DIRECTOR], r"show me movies directed by (.+)"),
    (Intent::PersonInfo, &[roles::DIRECTOR], r"list (.+)'s movies as director"),
    (Intent::PersonInfo, &[roles::DIRECTOR], r"(?:which|what) (?:movies|films) (?:were|was) directed by (.+)"),
    (Intent::PersonInfo, &[roles::ACTOR], r"what movies did (.+) act in"),
    (Intent::PersonInfo, &[roles::ACTOR], r"show me movies starring (.+)"),
    (Intent::PersonInfo, &[roles::ACTOR], r"which movies featured (.+)"),
    (Intent::PersonInfo, &[roles::WRITER], r"what movies did (.+) write"),
    (Intent::PersonInfo, &[roles::WRITER], r"(?:which|what) (?:movies|films) (?:were|was) written by (.+)"),
    (Intent::MovieInfo, &[roles::MOVIE_TITLE], r"tell me about the movie (.+)"),
    (Intent::MovieInfo, &[roles::MOVIE_TITLE], r"what is the information for (.+)"),
    (Intent::MovieInfo, &[roles::MOVIE_TITLE], r"show details of movie (.+)"),
    (Intent::MovieInfo, &[roles::MOVIE_TITLE], r"who (?:directed|starred in|wrote) (.+)"),
    (Intent::Comparison, &[roles::MOVIE_TITLE, roles::MOVIE_TITLE], r"compare (.+?) (?:and|with|to|vs\.?) (.+)"),
    (Intent::Statistics, &[roles::YEAR], r"(?:what are |show me |list )?the (?:top|best|highest[- ]rated|top[- ]rated|best[- ]rated) (?:movies|films)(?: (?:of|from|in) (\d{4}))?"),
    (Intent::Statistics, &[roles::DIRECTOR], r"how many (?:movies|films) did (.+) direct"),
    (Intent::Statistics, &[roles::ACTOR], r"how many (?:movies|films) (?:did|has) (.+) (?:act|acted|star|starred) in"),
    (Intent::Statistics, &[roles::WRITER], r"how many (?:movies|films) did (.+) write"),
    (Intent::MovieSearch, &[roles::GENRE, roles::YEAR], r"(?:show me|list|what are)(?: the)?(?: top[- ]rated| highest[- ]rated| best[- ]rated| best| top)? (.+?) (?:movies|films)(?: (?:of|from|in) (\d{4}))?"),
];

impl PatternIntentExtractor {
    pub fn new() -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|(intent, roles, src)| {
                match Regex::new(&format!(r"(?i)^\s*{src}")) {
                    Ok(regex) => Some(QuestionPattern {
                        intent: *intent,
                        roles: *roles,
                        regex,
                    }),
                    Err(e) => {
                        tracing::error!(pattern = *src, error = %e, "invalid question pattern");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Synchronous matching; `extract` is a thin async wrapper.
    pub fn match_question(&self, question: &str) -> StructuredQueryIntent {
        let trimmed = question.trim();
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(trimmed) else {
                continue;
            };
            let mut intent = StructuredQueryIntent::new(pattern.intent, question);
            for (i, role) in pattern.roles.iter().enumerate() {
                if let Some(m) = caps.get(i + 1) {
                    intent.push_entity(role, strip_punctuation(m.as_str()));
                }
            }
            return intent;
        }
        StructuredQueryIntent::unknown(question)
    }
}

impl Default for PatternIntentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentExtractor for PatternIntentExtractor {
    async fn extract(&self, question: &str) -> Result<StructuredQueryIntent> {
        let intent = self.match_question(question);
        if intent.is_unknown() {
            tracing::debug!("no question pattern matched");
        }
        Ok(intent)
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

/// Trim whitespace and ASCII punctuation from both ends.
fn strip_punctuation(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
}
