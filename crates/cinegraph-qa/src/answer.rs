//! Result rows → prose.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::llm::{complete_text, CompletionOptions, CompletionProvider, CompletionRequest};
use crate::result::{ResultSet, Row};

/// Fixed reply for an empty result set.
pub const NO_INFORMATION: &str =
    "I couldn't find any information in the movie graph that answers your question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Llm,
    Template,
    NoResults,
}

impl AnswerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerSource::Llm => "llm",
            AnswerSource::Template => "template",
            AnswerSource::NoResults => "no_results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    pub fn no_information() -> Self {
        Self {
            text: NO_INFORMATION.to_string(),
            source: AnswerSource::NoResults,
        }
    }
}

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, question: &str, results: &ResultSet) -> Result<Answer>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Template answers
// ============================================================================

const CARD_COLUMNS: [&str; 3] = ["directors", "actors", "genres"];

#[derive(Debug, Clone, Copy)]
pub struct TemplateAnswerSynthesizer {
    max_rows: usize,
}

impl Default for TemplateAnswerSynthesizer {
    fn default() -> Self {
        Self { max_rows: 25 }
    }
}

impl TemplateAnswerSynthesizer {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
        }
    }

    /// Deterministic rendering picked from the row shape: movie info cards,
    /// filmography lines, or plain `col: value` lines.
    pub fn render(&self, results: &ResultSet) -> Answer {
        if results.is_empty() {
            return Answer::no_information();
        }

        let is_card = results.has_column("movie")
            && CARD_COLUMNS.iter().any(|c| results.has_column(c));
        let is_listing = results.has_column("movie");

        let mut blocks: Vec<String> = results
            .rows
            .iter()
            .take(self.max_rows)
            .map(|row| {
                if is_card {
                    info_card(row)
                } else if is_listing {
                    listing_line(row)
                } else {
                    row.render()
                }
            })
            .collect();

        if results.len() > self.max_rows {
            blocks.push(format!("… and {} more.", results.len() - self.max_rows));
        }

        let separator = if is_card { "\n\n" } else { "\n" };
        Answer {
            text: blocks.join(separator),
            source: AnswerSource::Template,
        }
    }
}

fn present(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .filter(|v| !v.is_null())
        .map(ToString::to_string)
        .filter(|s| !s.is_empty())
}

/// `Inception (2010) - Rating: 8.8`, plus any extra columns in parentheses.
fn listing_line(row: &Row) -> String {
    let mut line = present(row, "movie").unwrap_or_default();
    if let Some(year) = present(row, "year") {
        line.push_str(&format!(" ({year})"));
    }
    if let Some(rating) = present(row, "rating") {
        line.push_str(&format!(" - Rating: {rating}"));
    }
    let extras: Vec<String> = row
        .iter()
        .filter(|(c, v)| !matches!(*c, "movie" | "year" | "rating") && !v.is_null())
        .map(|(c, v)| format!("{c}: {v}"))
        .collect();
    if !extras.is_empty() {
        line.push_str(&format!(" ({})", extras.join(", ")));
    }
    line
}

fn info_card(row: &Row) -> String {
    let mut lines = Vec::new();
    let title = present(row, "movie").unwrap_or_default();
    match present(row, "year") {
        Some(year) => lines.push(format!("Movie: {title} ({year})")),
        None => lines.push(format!("Movie: {title}")),
    }
    for (column, label) in [
        ("rating", "Rating"),
        ("certificate", "Certificate"),
        ("runtime", "Runtime"),
        ("directors", "Directors"),
        ("genres", "Genres"),
        ("actors", "Actors"),
    ] {
        if let Some(value) = present(row, column) {
            lines.push(format!("{label}: {value}"));
        }
    }
    lines.join("\n")
}

#[async_trait]
impl AnswerSynthesizer for TemplateAnswerSynthesizer {
    async fn synthesize(&self, _question: &str, results: &ResultSet) -> Result<Answer> {
        Ok(self.render(results))
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

// ============================================================================
// LLM answers
// ============================================================================

const ANSWER_PROMPT: &str = "You are a helpful movie information assistant.
Answer the user's question using ONLY the query results provided.
- Do not mention movies, people, years or numbers that are not in the results.
- Be concise but informative, in a friendly conversational tone.
- Include relevant numbers (years, ratings) when they help.
- When there are several rows, highlight patterns such as the top values or counts.";

pub struct LlmAnswerSynthesizer {
    provider: Arc<dyn CompletionProvider>,
    options: CompletionOptions,
    timeout: Option<Duration>,
    max_prompt_rows: usize,
    strict_grounding: bool,
    fallback: TemplateAnswerSynthesizer,
}

impl LlmAnswerSynthesizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            options: CompletionOptions::new(600, 0.7),
            timeout: None,
            max_prompt_rows: 40,
            strict_grounding: true,
            fallback: TemplateAnswerSynthesizer::default(),
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

    pub fn with_max_prompt_rows(mut self, rows: usize) -> Self {
        self.max_prompt_rows = rows.max(1);
        self
    }

    pub fn with_strict_grounding(mut self, strict: bool) -> Self {
        self.strict_grounding = strict;
        self
    }

    pub fn with_fallback(mut self, fallback: TemplateAnswerSynthesizer) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn build_request(&self, question: &str, results: &ResultSet) -> CompletionRequest {
        let shown = results.len().min(self.max_prompt_rows);
        let header = if shown < results.len() {
            format!(
                "Query results ({} rows, first {} shown):",
                results.len(),
                shown
            )
        } else {
            format!("Query results ({} rows):", results.len())
        };

        let mut user = format!(
            "Question: {}\n\n{}\n{}\n",
            question.trim(),
            header,
            results.render_compact(self.max_prompt_rows)
        );
        if results.len() >= 3 {
            user.push_str("\nSummarize the notable patterns (top values, counts) before listing details.\n");
        }
        user.push_str("\nAnswer:");

        CompletionRequest::new(ANSWER_PROMPT, user, self.options)
    }
}

#[async_trait]
impl AnswerSynthesizer for LlmAnswerSynthesizer {
    async fn synthesize(&self, question: &str, results: &ResultSet) -> Result<Answer> {
        if results.is_empty() {
            return Ok(Answer::no_information());
        }

        let text = complete_text(
            self.provider.as_ref(),
            self.build_request(question, results),
            self.timeout,
        )
        .await?;

        let ungrounded = ungrounded_terms(&text, question, results);
        if !ungrounded.is_empty() {
            tracing::warn!(?ungrounded, strict = self.strict_grounding, "answer mentions values absent from the results");
            if self.strict_grounding {
                return Ok(self.fallback.render(results));
            }
        }

        Ok(Answer {
            text,
            source: AnswerSource::Llm,
        })
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

// ============================================================================
// Grounding
// ============================================================================

/// Capitalised words that carry no entity information.
const COMMON_WORDS: &[&str] = &[
    "a", "an", "the", "i", "it", "its", "this", "that", "these", "those", "here", "there", "he",
    "she", "they", "his", "her", "their", "and", "or", "but", "of", "in", "on", "at", "with", "by",
    "for", "from", "to", "as", "also", "both", "all", "some", "among", "overall", "yes", "no",
    "rating", "ratings", "rated", "year", "years", "movie", "movies", "film", "films", "imdb",
    "notably", "interestingly", "additionally", "however", "if", "you", "your", "we", "our",
    "directed", "director", "directors", "actor", "actors", "genre", "genres", "runtime",
    "certificate",
];

struct Token<'a> {
    text: &'a str,
    /// First word of a sentence (or of the text).
    sentence_start: bool,
    /// Only whitespace separates this token from the previous one.
    joined: bool,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut sentence_start = true;
    let mut joined = false;
    let mut start: Option<usize> = None;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (i, &(idx, ch)) in chars.iter().enumerate() {
        let next_is_digit = chars.get(i + 1).is_some_and(|(_, c)| c.is_ascii_digit());
        let in_number = start.is_some_and(|s| text[s..idx].chars().all(|c| c.is_ascii_digit()));
        let is_word = ch.is_alphanumeric()
            || ((ch == '\'' || ch == '’' || ch == '-') && start.is_some())
            || (ch == '.' && in_number && next_is_digit);

        if is_word {
            if start.is_none() {
                start = Some(idx);
            }
            continue;
        }

        if let Some(s) = start.take() {
            tokens.push(Token {
                text: &text[s..idx],
                sentence_start,
                joined,
            });
            sentence_start = false;
            joined = true;
        }
        if matches!(ch, '.' | '!' | '?' | ':' | '\n') {
            sentence_start = true;
        }
        if !ch.is_whitespace() || ch == '\n' {
            joined = false;
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            text: &text[s..],
            sentence_start,
            joined,
        });
    }
    tokens
}

fn strip_possessive(word: &str) -> &str {
    word.strip_suffix("'s")
        .or_else(|| word.strip_suffix("’s"))
        .unwrap_or(word)
        .trim_end_matches(['\'', '’', '-'])
}

fn numbers_in(text: &str) -> Vec<f64> {
    tokenize(text)
        .iter()
        .filter_map(|t| t.text.parse::<f64>().ok())
        .collect()
}

/// Numbers and proper names in `answer` found neither in `question` nor in
/// `results`.
///
/// Numbers match within rounding to one decimal; counts up to the row count
/// are allowed. Names are runs of capitalised words; a lone capitalised word
/// at the start of a sentence is ignored.
pub fn ungrounded_terms(answer: &str, question: &str, results: &ResultSet) -> Vec<String> {
    let texts = results.texts();
    let mut corpus = texts.join("\n").to_lowercase();
    corpus.push('\n');
    corpus.push_str(&question.to_lowercase());

    let mut known_numbers: Vec<f64> = texts.iter().flat_map(|t| numbers_in(t)).collect();
    known_numbers.extend(numbers_in(question));

    let mut ungrounded = Vec::new();
    let mut seen = HashSet::new();
    let mut flag = |term: String, out: &mut Vec<String>| {
        if seen.insert(term.clone()) {
            out.push(term);
        }
    };

    let tokens = tokenize(answer);

    for t in &tokens {
        let Ok(n) = t.text.parse::<f64>() else {
            continue;
        };
        let is_count = n.fract() == 0.0 && n >= 0.0 && n <= results.len().max(10) as f64;
        let matches_known = known_numbers
            .iter()
            .any(|k| (k - n).abs() < 1e-9 || (k.fract() != 0.0 && (k - n).abs() < 0.05));
        if !(is_count || matches_known) {
            flag(t.text.to_string(), &mut ungrounded);
        }
    }

    let is_capitalised = |t: &Token<'_>| t.text.chars().next().is_some_and(char::is_uppercase);
    let mut i = 0;
    while i < tokens.len() {
        if !is_capitalised(&tokens[i]) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < tokens.len() && tokens[j].joined && is_capitalised(&tokens[j]) {
            j += 1;
        }
        let run = &tokens[i..j];
        let meaningful: Vec<&str> = run
            .iter()
            .map(|t| strip_possessive(t.text))
            .filter(|w| !COMMON_WORDS.contains(&w.to_lowercase().as_str()))
            .collect();
        let lone_sentence_opener = run.len() == 1 && run[0].sentence_start;
        if !meaningful.is_empty() && !lone_sentence_opener {
            let missing = meaningful
                .iter()
                .any(|w| !corpus.contains(&w.to_lowercase()));
            if missing {
                flag(meaningful.join(" "), &mut ungrounded);
            }
        }
        i = j;
    }

    ungrounded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nolan() -> ResultSet {
        ResultSet::from_rows(vec![
            Row::new().with("movie", "Inception").with("year", 2010).with("rating", 8.8),
            Row::new().with("movie", "The Dark Knight").with("year", 2008).with("rating", 9.0),
            Row::new().with("movie", "Memento").with("year", 2000).with("rating", 8.4),
        ])
    }

    #[test]
    fn listing_lines_follow_the_classic_format() {
        let answer = TemplateAnswerSynthesizer::default().render(&nolan());
        assert_eq!(answer.source, AnswerSource::Template);
        assert_eq!(
            answer.text.lines().next().unwrap(),
            "Inception (2010) - Rating: 8.8"
        );
        assert!(answer.text.contains("The Dark Knight (2008) - Rating: 9.0"));
    }

    #[test]
    fn template_caps_rows() {
        let answer = TemplateAnswerSynthesizer::new(2).render(&nolan());
        assert_eq!(answer.text.lines().count(), 3);
        assert!(answer.text.ends_with("… and 1 more."));
    }

    #[test]
    fn info_cards() {
        let rs = ResultSet::from_rows(vec![Row::new()
            .with("movie", "Heat")
            .with("year", 1995)
            .with("rating", 8.3)
            .with("certificate", "R")
            .with("runtime", "2h 50m")
            .with("directors", vec!["Michael Mann"])
            .with("actors", vec!["Al Pacino", "Robert De Niro"])
            .with("genres", vec!["Crime", "Drama"])]);
        let text = TemplateAnswerSynthesizer::default().render(&rs).text;
        assert!(text.starts_with("Movie: Heat (1995)\nRating: 8.3\nCertificate: R"));
        assert!(text.contains("Directors: Michael Mann"));
        assert!(text.ends_with("Actors: Al Pacino, Robert De Niro"));
    }

    #[test]
    fn empty_results_get_fixed_text() {
        let answer = TemplateAnswerSynthesizer::default().render(&ResultSet::empty());
        assert_eq!(answer, Answer::no_information());
        assert!(!answer.text.is_empty());
    }

    #[test]
    fn grounded_answers_pass() {
        let answer = "Christopher Nolan directed Inception (2010), The Dark Knight (2008) and Memento. \
                      The Dark Knight is the top rated at 9.0, and all 3 films score above 8.";
        let missing = ungrounded_terms(answer, "What movies did Christopher Nolan direct?", &nolan());
        assert!(missing.is_empty(), "unexpected: {missing:?}");
    }

    #[test]
    fn invented_titles_and_years_are_flagged() {
        let answer = "Nolan also directed Tenet in 2020.";
        let missing = ungrounded_terms(answer, "What movies did Christopher Nolan direct?", &nolan());
        assert_eq!(missing, vec!["2020".to_string(), "Tenet".to_string()]);
    }

    #[test]
    fn prompt_truncates_rows() {
        struct Never;
        #[async_trait]
        impl CompletionProvider for Never {
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> std::result::Result<crate::llm::CompletionResponse, crate::llm::LlmError> {
                Err(crate::llm::LlmError::Network("offline".into()))
            }
            fn model_info(&self) -> crate::llm::ModelInfo {
                crate::llm::ModelInfo {
                    name: "never".into(),
                    provider: "test".into(),
                }
            }
        }

        let synth = LlmAnswerSynthesizer::new(Arc::new(Never)).with_max_prompt_rows(2);
        let req = synth.build_request("q", &nolan());
        assert!(req.user().contains("(3 rows, first 2 shown)"));
        assert!(req.user().contains("(1 more rows not shown)"));
        assert!(req.user().contains("patterns"));
        assert!(!req.user().contains("Memento"));
    }
}
