//! Candidate query synthesis.
//!
//! Two strategies share one contract:
//! - [`TemplateSynthesizer`] maps an extracted intent onto a fixed Cypher
//!   template and binds entities as parameters (no LLM).
//! - [`LlmSynthesizer`] asks the model for a single read-only query, grounded
//!   in the schema text, and pulls the query out of whatever prose surrounds it.
//!
//! Whatever a strategy produces is checked here for shape only (one statement,
//! no write clauses). Whether the engine accepts it is the executor's call.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{QaError, Result};
use crate::graph::{starts_with_keyword, Params};
use crate::intent::{roles, Intent, StructuredQueryIntent};
use crate::llm::{complete_text, CompletionOptions, CompletionProvider, CompletionRequest};
use crate::schema::SchemaDescriptor;

// ============================================================================
// Candidate query
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValidity {
    /// Not yet seen by the engine.
    Unchecked,
    /// The engine compiled it.
    Accepted,
    /// The engine refused it; this text is never submitted again.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOrigin {
    Template(&'static str),
    Llm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub text: String,
    pub parameters: Params,
    pub validity: QueryValidity,
    pub origin: QueryOrigin,
}

impl CandidateQuery {
    pub fn new(text: impl Into<String>, parameters: Params, origin: QueryOrigin) -> Self {
        Self {
            text: text.into(),
            parameters,
            validity: QueryValidity::Unchecked,
            origin,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.validity == QueryValidity::Accepted
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.validity, QueryValidity::Rejected(_))
    }

    pub fn mark_accepted(&mut self) {
        self.validity = QueryValidity::Accepted;
    }

    pub fn mark_rejected(&mut self, reason: impl Into<String>) {
        self.validity = QueryValidity::Rejected(reason.into());
    }

    /// Same statement and bindings, ignoring validity.
    pub fn same_as(&self, other: &CandidateQuery) -> bool {
        squash_whitespace(&self.text) == squash_whitespace(&other.text)
            && self.parameters == other.parameters
    }
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A query the engine refused, fed back into the next synthesis attempt.
#[derive(Debug, Clone)]
pub struct PreviousAttempt {
    pub query: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub question: &'a str,
    /// Absent when LLM mode skips extraction.
    pub intent: Option<&'a StructuredQueryIntent>,
    pub schema: &'a SchemaDescriptor,
    pub previous: Option<&'a PreviousAttempt>,
}

impl<'a> SynthesisRequest<'a> {
    pub fn new(question: &'a str, schema: &'a SchemaDescriptor) -> Self {
        Self {
            question,
            intent: None,
            schema,
            previous: None,
        }
    }

    pub fn with_intent(mut self, intent: &'a StructuredQueryIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_previous(mut self, previous: &'a PreviousAttempt) -> Self {
        self.previous = Some(previous);
        self
    }
}

#[async_trait]
pub trait QuerySynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<CandidateQuery>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Templates
// ============================================================================

// Filmography for one person, narrowed by `$year` and `$genre` when they are
// not null.
macro_rules! person_movies {
    ($pattern:literal, $extra:literal) => {
        concat!(
            "MATCH ",
            $pattern,
            "\nWHERE p.name = $param1",
            "\n  AND ($year IS NULL OR m.year = $year)",
            "\n  AND ($genre IS NULL OR any(g IN [(m)-[:BELONGS_TO]->(x:Genre) | x.name] WHERE toLower(g) = toLower($genre)))",
            "\nRETURN m.name as movie, m.year as year, m.rating as rating",
            $extra,
            "\nORDER BY m.rating DESC"
        )
    };
}

const DIRECTOR_FILMOGRAPHY: &str = person_movies!("(p:Person)-[:DIRECTED]->(m:Movie)", "");

const ACTOR_FILMOGRAPHY: &str = person_movies!("(p:Person)-[:ACTED_IN]->(m:Movie)", "");

const WRITER_FILMOGRAPHY: &str = person_movies!("(p:Person)-[:WROTE]->(m:Movie)", "");

const PERSON_CREDITS: &str = person_movies!(
    "(p:Person)-[r:DIRECTED|ACTED_IN|WROTE]->(m:Movie)",
    ", collect(DISTINCT type(r)) as credits"
);

const MOVIE_INFO: &str = "MATCH (m:Movie)
WHERE m.name = $param1
OPTIONAL MATCH (p1:Person)-[:DIRECTED]->(m)
OPTIONAL MATCH (p2:Person)-[:ACTED_IN]->(m)
OPTIONAL MATCH (m)-[:BELONGS_TO]->(g:Genre)
RETURN m.name as movie, m.year as year, m.rating as rating,
       m.certificate as certificate, m.run_time as runtime,
       collect(DISTINCT p1.name) as directors,
       collect(DISTINCT p2.name) as actors,
       collect(DISTINCT g.name) as genres";

const GENRE_MOVIES: &str = "MATCH (m:Movie)-[:BELONGS_TO]->(g:Genre)
WHERE toLower(g.name) = toLower($param1)
  AND ($year IS NULL OR m.year = $year)
RETURN m.name as movie, m.year as year, m.rating as rating
ORDER BY m.rating DESC
LIMIT 25";

const COMPARISON: &str = "MATCH (m:Movie)
WHERE m.name IN $titles
RETURN m.name as movie, m.year as year, m.rating as rating,
       m.run_time as runtime, m.budget as budget, m.box_office as box_office
ORDER BY m.rating DESC";

const TOP_RATED: &str = "MATCH (m:Movie)
WHERE $year IS NULL OR m.year = $year
RETURN m.name as movie, m.year as year, m.rating as rating
ORDER BY m.rating DESC
LIMIT 10";

const PERSON_ROLES: [(&str, &str, &str); 4] = [
    (roles::DIRECTOR, "director_movies", DIRECTOR_FILMOGRAPHY),
    (roles::ACTOR, "actor_movies", ACTOR_FILMOGRAPHY),
    (roles::WRITER, "writer_movies", WRITER_FILMOGRAPHY),
    (roles::PERSON, "person_credits", PERSON_CREDITS),
];

/// Fixed intent → Cypher table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSynthesizer;

impl TemplateSynthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Picks a template for `intent` and binds its entities.
    ///
    /// Every entity the chosen template can filter on is bound; an intent
    /// whose entities no template can use is unsupported rather than
    /// answered with an unfiltered query.
    pub fn plan(&self, intent: &StructuredQueryIntent) -> Result<CandidateQuery> {
        let unsupported = |reason: &str| QaError::UnsupportedIntent {
            intent: intent.intent.to_string(),
            reason: reason.to_string(),
        };

        match intent.intent {
            Intent::Unknown => Err(unsupported("no template for unrecognised questions")),
            Intent::PersonInfo => entity_query(intent)
                .ok_or_else(|| unsupported("no person, genre or title to search by")),
            Intent::MovieSearch => entity_query(intent)
                .or_else(|| intent.first(roles::YEAR).map(|_| top_rated(intent)))
                .ok_or_else(|| unsupported("no person, genre, title or year to search by")),
            Intent::MovieInfo => intent
                .first(roles::MOVIE_TITLE)
                .map(movie_info)
                .ok_or_else(|| unsupported("no movie title in the question")),
            Intent::Comparison => {
                let titles = intent.all(roles::MOVIE_TITLE);
                if titles.len() < 2 {
                    return Err(unsupported("a comparison needs at least two movie titles"));
                }
                let mut params = Params::new();
                params.insert("titles".into(), serde_json::json!(titles));
                Ok(CandidateQuery::new(
                    COMPARISON,
                    params,
                    QueryOrigin::Template("movie_comparison"),
                ))
            }
            Intent::Statistics => {
                if let Some(query) = entity_query(intent) {
                    return Ok(query);
                }
                if intent.entities.iter().all(|e| e.role == roles::YEAR) {
                    return Ok(top_rated(intent));
                }
                Err(unsupported("no ranking template for the named entities"))
            }
        }
    }
}

/// A person, genre or title entity mapped onto its template.
fn entity_query(intent: &StructuredQueryIntent) -> Option<CandidateQuery> {
    for (role, name, text) in PERSON_ROLES {
        if let Some(person) = intent.first(role) {
            let mut params = single_param(person);
            params.insert("year".into(), year_param(intent));
            params.insert(
                "genre".into(),
                serde_json::json!(intent.first(roles::GENRE)),
            );
            return Some(CandidateQuery::new(text, params, QueryOrigin::Template(name)));
        }
    }
    if let Some(genre) = intent.first(roles::GENRE) {
        let mut params = single_param(genre);
        params.insert("year".into(), year_param(intent));
        return Some(CandidateQuery::new(
            GENRE_MOVIES,
            params,
            QueryOrigin::Template("genre_movies"),
        ));
    }
    intent.first(roles::MOVIE_TITLE).map(movie_info)
}

fn single_param(value: &str) -> Params {
    let mut params = Params::new();
    params.insert("param1".into(), serde_json::Value::String(value.to_string()));
    params
}

fn year_param(intent: &StructuredQueryIntent) -> serde_json::Value {
    serde_json::json!(intent
        .first(roles::YEAR)
        .and_then(|y| y.trim().parse::<i64>().ok()))
}

fn movie_info(title: &str) -> CandidateQuery {
    CandidateQuery::new(
        MOVIE_INFO,
        single_param(title),
        QueryOrigin::Template("movie_info"),
    )
}

fn top_rated(intent: &StructuredQueryIntent) -> CandidateQuery {
    let mut params = Params::new();
    params.insert("year".into(), year_param(intent));
    CandidateQuery::new(TOP_RATED, params, QueryOrigin::Template("top_rated"))
}

#[async_trait]
impl QuerySynthesizer for TemplateSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<CandidateQuery> {
        let intent = request.intent.ok_or_else(|| QaError::UnsupportedIntent {
            intent: Intent::Unknown.to_string(),
            reason: "template synthesis needs an extracted intent".into(),
        })?;
        let query = self.plan(intent)?;
        tracing::debug!(template = ?query.origin, query = %query.text, "template selected");
        Ok(query)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

// ============================================================================
// LLM synthesis
// ============================================================================

const SYSTEM_PROMPT: &str = "You are a Cypher query generator for a movie knowledge graph.

Schema:
{schema}
Rules:
- Return exactly ONE read-only Cypher query inside a ```cypher fenced block.
- Use only the labels, relationship types and properties listed in the schema.
- Never write to the graph (no CREATE, MERGE, DELETE, SET, REMOVE or DROP).
- Match names exactly as written in the question; return readable columns with `as` aliases.
- Order results when the question implies a ranking, and LIMIT long listings.
- Do not add explanations.";

pub struct LlmSynthesizer {
    provider: Arc<dyn CompletionProvider>,
    options: CompletionOptions,
    timeout: Option<Duration>,
}

impl LlmSynthesizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            options: CompletionOptions::new(512, 0.0),
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

    pub fn build_request(&self, request: &SynthesisRequest<'_>) -> CompletionRequest {
        let system = SYSTEM_PROMPT.replace("{schema}", &request.schema.describe());

        let mut user = format!("Question: {}\n", request.question.trim());
        if let Some(intent) = request.intent.filter(|i| !i.is_unknown()) {
            user.push_str(&format!("\nExtracted intent: {}\n", intent.intent));
            if !intent.entities.is_empty() {
                user.push_str("Entities:\n");
                for e in &intent.entities {
                    user.push_str(&format!("- {}: {}\n", e.role, e.value));
                }
            }
        }
        if let Some(prev) = request.previous {
            user.push_str(&format!(
                "\nThe previous query was rejected by the database:\n```cypher\n{}\n```\nError: {}\nReturn a corrected query.\n",
                prev.query.trim(),
                prev.error.trim()
            ));
        }
        user.push_str("\nGenerate the Cypher query.");

        CompletionRequest::new(system, user, self.options)
    }
}

#[async_trait]
impl QuerySynthesizer for LlmSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<CandidateQuery> {
        let completion = complete_text(
            self.provider.as_ref(),
            self.build_request(&request),
            self.timeout,
        )
        .await?;

        let text = extract_query_block(&completion).ok_or_else(|| {
            QaError::QuerySynthesisFailed("no Cypher query found in the completion".into())
        })?;
        check_query_shape(&text)?;

        let unknown = request.schema.unknown_identifiers(&text);
        if !unknown.is_empty() {
            tracing::warn!(?unknown, "generated query references identifiers outside the schema");
        }
        tracing::debug!(query = %text, "LLM query synthesized");
        Ok(CandidateQuery::new(text, Params::new(), QueryOrigin::Llm))
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

// ============================================================================
// Query text helpers
// ============================================================================

const CLAUSE_KEYWORDS: [&str; 8] = [
    "MATCH", "OPTIONAL", "WITH", "UNWIND", "CALL", "RETURN", "EXPLAIN", "USE",
];

const WRITE_KEYWORDS: [&str; 8] = [
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH",
];

/// Pull one query out of model output.
///
/// Order: the first fenced block, then a `Cypher:` / `Query:` labelled block,
/// then a bare response that starts with a clause keyword.
pub fn extract_query_block(completion: &str) -> Option<String> {
    let text = completion.trim();
    let block = fenced_block(text)
        .or_else(|| labelled_block(text))
        .or_else(|| bare_query(text))?;

    let mut query = block.trim().to_string();
    while query.ends_with(';') {
        query.pop();
        query = query.trim_end().to_string();
    }
    (!query.is_empty()).then_some(query)
}

fn fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let line_end = after.find('\n').map_or(after.len(), |i| i + 1);
    let info = after[..line_end].trim();

    // ```MATCH (n) RETURN n``` or ```cypher MATCH (n) RETURN n``` on one line.
    if let Some(one_line) = info.strip_suffix("```") {
        let query = strip_language_word(one_line.trim());
        return (!query.is_empty()).then(|| query.to_string());
    }

    let body = &after[line_end..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    // The info string (```cypher, ```sql, ...) is dropped unless the query
    // starts on the fence line.
    let block = if info.is_empty() || is_language_tag(info) {
        body.trim().to_string()
    } else {
        format!("{}\n{}", strip_language_word(info), body.trim_end())
            .trim()
            .to_string()
    };
    (!block.is_empty()).then_some(block)
}

/// `cypher MATCH ...` → `MATCH ...`.
fn strip_language_word(line: &str) -> &str {
    match line.split_once(char::is_whitespace) {
        Some((head, rest))
            if is_language_tag(head)
                && !starts_with_clause(head)
                && starts_with_clause(rest.trim_start()) =>
        {
            rest.trim_start()
        }
        _ => line,
    }
}

fn starts_with_clause(text: &str) -> bool {
    CLAUSE_KEYWORDS
        .iter()
        .any(|kw| starts_with_keyword(text, kw))
}

fn is_language_tag(info: &str) -> bool {
    !info.contains(char::is_whitespace) && info.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn labelled_block(text: &str) -> Option<String> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        let rest = ["cypher:", "query:", "cypher query:"]
            .iter()
            .find_map(|label| {
                trimmed
                    .get(..label.len())
                    .filter(|head| head.eq_ignore_ascii_case(label))
                    .map(|_| &trimmed[label.len()..])
            });
        let Some(rest) = rest else { continue };

        let mut block = rest.trim().to_string();
        for next in lines.by_ref() {
            if next.trim().is_empty() {
                if block.is_empty() {
                    continue;
                }
                break;
            }
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(next.trim_end());
        }
        if !block.trim().is_empty() {
            return Some(block);
        }
    }
    None
}

/// A response that opens with a clause keyword, up to the first blank line.
fn bare_query(text: &str) -> Option<String> {
    if !starts_with_clause(text) {
        return None;
    }
    let lines: Vec<&str> = text
        .lines()
        .take_while(|line| !line.trim().is_empty())
        .collect();
    Some(lines.join("\n"))
}

/// The query with string literals, backtick identifiers and comments blanked
/// out, so keyword and `;` scans only see code.
fn code_only(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                out.push(' ');
                while let Some(c) = chars.next() {
                    if c == '\\' && ch != '`' {
                        chars.next();
                    } else if c == ch {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Number of non-empty `;`-separated statements outside literals.
pub fn statement_count(query: &str) -> usize {
    code_only(query)
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Write clauses found outside literals, property accesses and parameters.
pub fn write_clauses(query: &str) -> Vec<String> {
    let code = code_only(query);
    let mut found = Vec::new();
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_sep = ' ';
    for ch in code.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            current.push(ch);
            continue;
        }
        if !current.is_empty() {
            words.push((prev_sep, std::mem::take(&mut current), ch));
        }
        prev_sep = ch;
    }

    for (i, (before, word, after)) in words.iter().enumerate() {
        // m.set, $set, {set: 1}
        if *before == '.' || *before == '$' || *after == ':' {
            continue;
        }
        let upper = word.to_ascii_uppercase();
        if WRITE_KEYWORDS.contains(&upper.as_str()) {
            found.push(upper);
        } else if upper == "LOAD"
            && words
                .get(i + 1)
                .is_some_and(|(_, next, _)| next.eq_ignore_ascii_case("CSV"))
        {
            found.push("LOAD CSV".to_string());
        }
    }
    found.dedup();
    found
}

/// Rejects multi-statement and writing queries.
pub fn check_query_shape(query: &str) -> Result<()> {
    let statements = statement_count(query);
    if statements == 0 {
        return Err(QaError::QuerySynthesisFailed("empty query".into()));
    }
    if statements > 1 {
        return Err(QaError::QuerySynthesisFailed(format!(
            "completion contains {statements} statements; expected exactly one"
        )));
    }
    let writes = write_clauses(query);
    if !writes.is_empty() {
        return Err(QaError::QuerySynthesisFailed(format!(
            "query would modify the graph ({})",
            writes.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_wins_over_prose() {
        let text = "Here is the query:\n```cypher\nMATCH (p:Person {name: 'Christopher Nolan'})-[:DIRECTED]->(m:Movie)\nRETURN m.name\n```\nIt lists the movies.";
        let q = extract_query_block(text).unwrap();
        assert!(q.starts_with("MATCH (p:Person"));
        assert!(q.ends_with("RETURN m.name"));
    }

    #[test]
    fn labelled_and_bare_queries() {
        let labelled = "Sure.\nCypher: MATCH (m:Movie)\nRETURN m.name;\n\nThis returns names.";
        assert_eq!(
            extract_query_block(labelled).unwrap(),
            "MATCH (m:Movie)\nRETURN m.name"
        );
        assert_eq!(
            extract_query_block("match (m:Movie) return count(m);").unwrap(),
            "match (m:Movie) return count(m)"
        );
        assert!(extract_query_block("I am not sure what you mean.").is_none());
        assert!(extract_query_block("```\n```").is_none());
    }

    #[test]
    fn single_line_fence() {
        assert_eq!(
            extract_query_block("```MATCH (m:Movie) RETURN m```").unwrap(),
            "MATCH (m:Movie) RETURN m"
        );
        assert_eq!(
            extract_query_block("```cypher MATCH (n) RETURN n```").unwrap(),
            "MATCH (n) RETURN n"
        );
        assert_eq!(
            extract_query_block("```cypher MATCH (m:Movie)\nRETURN m.name\n```").unwrap(),
            "MATCH (m:Movie)\nRETURN m.name"
        );
    }

    #[test]
    fn bare_query_stops_at_the_first_blank_line() {
        let text = "MATCH (m:Movie)\nRETURN m.name AS movie\n\nThis query lists every movie title.";
        assert_eq!(
            extract_query_block(text).unwrap(),
            "MATCH (m:Movie)\nRETURN m.name AS movie"
        );
    }

    #[test]
    fn statements_are_counted_outside_literals() {
        assert_eq!(statement_count("MATCH (m {name: 'a;b'}) RETURN m;"), 1);
        assert_eq!(statement_count("MATCH (m) RETURN m; MATCH (p) RETURN p"), 2);
        assert!(check_query_shape("MATCH (m) RETURN m; MATCH (p) RETURN p").is_err());
    }

    #[test]
    fn write_clauses_are_rejected() {
        assert_eq!(write_clauses("MATCH (m) DETACH DELETE m"), vec!["DETACH", "DELETE"]);
        assert_eq!(write_clauses("LOAD CSV FROM 'x' AS row RETURN row"), vec!["LOAD CSV"]);
        assert!(write_clauses("MATCH (m:Movie {name: 'Set It Up'}) RETURN m.set, $create").is_empty());
        let err = check_query_shape("MERGE (p:Person {name: 'x'})").unwrap_err();
        assert_eq!(err.code(), "query_synthesis_failed");
    }

    #[test]
    fn templates_bind_entities_as_parameters() {
        let intent = StructuredQueryIntent::new(Intent::PersonInfo, "q")
            .with_entity(roles::DIRECTOR, "Christopher Nolan");
        let q = TemplateSynthesizer::new().plan(&intent).unwrap();
        assert_eq!(q.origin, QueryOrigin::Template("director_movies"));
        assert!(q.text.contains("[:DIRECTED]->(m:Movie)"));
        assert_eq!(q.parameters["param1"], "Christopher Nolan");
        assert_eq!(q.validity, QueryValidity::Unchecked);
    }

    #[test]
    fn unknown_or_incomplete_intents_are_unsupported() {
        let synth = TemplateSynthesizer::new();
        let err = synth.plan(&StructuredQueryIntent::unknown("hello")).unwrap_err();
        assert_eq!(err.code(), "unsupported_intent");

        let lone = StructuredQueryIntent::new(Intent::Comparison, "compare")
            .with_entity(roles::MOVIE_TITLE, "Heat");
        assert!(matches!(synth.plan(&lone), Err(QaError::UnsupportedIntent { .. })));
    }

    #[test]
    fn statistics_parses_year() {
        let intent = StructuredQueryIntent::new(Intent::Statistics, "q").with_entity(roles::YEAR, "1994");
        let q = TemplateSynthesizer::new().plan(&intent).unwrap();
        assert_eq!(q.parameters["year"], 1994);
        let q = TemplateSynthesizer::new()
            .plan(&StructuredQueryIntent::new(Intent::Statistics, "q"))
            .unwrap();
        assert!(q.parameters["year"].is_null());
    }

    #[test]
    fn statistics_about_a_person_filter_by_that_person() {
        let intent = StructuredQueryIntent::new(Intent::Statistics, "q")
            .with_entity(roles::DIRECTOR, "Christopher Nolan");
        let q = TemplateSynthesizer::new().plan(&intent).unwrap();
        assert_eq!(q.origin, QueryOrigin::Template("director_movies"));
        assert_eq!(q.parameters["param1"], "Christopher Nolan");
        assert!(q.parameters["genre"].is_null());

        let odd = StructuredQueryIntent::new(Intent::Statistics, "q").with_entity("studio", "Pixar");
        let err = TemplateSynthesizer::new().plan(&odd).unwrap_err();
        assert_eq!(err.code(), "unsupported_intent");
    }

    #[test]
    fn genre_and_year_are_both_bound() {
        let intent = StructuredQueryIntent::new(Intent::MovieSearch, "q")
            .with_entity(roles::GENRE, "crime")
            .with_entity(roles::YEAR, "1994");
        let q = TemplateSynthesizer::new().plan(&intent).unwrap();
        assert_eq!(q.origin, QueryOrigin::Template("genre_movies"));
        assert_eq!(q.parameters["param1"], "crime");
        assert_eq!(q.parameters["year"], 1994);
        assert!(q.text.contains("$year IS NULL OR m.year = $year"));

        let intent = StructuredQueryIntent::new(Intent::PersonInfo, "q")
            .with_entity(roles::DIRECTOR, "Christopher Nolan")
            .with_entity(roles::GENRE, "crime");
        let q = TemplateSynthesizer::new().plan(&intent).unwrap();
        assert_eq!(q.parameters["genre"], "crime");
        assert!(q.parameters["year"].is_null());
        assert!(q.text.contains("toLower($genre)"));
    }

    #[test]
    fn same_as_ignores_layout() {
        let a = CandidateQuery::new("MATCH (m)\n  RETURN m", Params::new(), QueryOrigin::Llm);
        let mut b = CandidateQuery::new("MATCH (m) RETURN m", Params::new(), QueryOrigin::Llm);
        b.mark_rejected("nope");
        assert!(a.same_as(&b));
    }
}
