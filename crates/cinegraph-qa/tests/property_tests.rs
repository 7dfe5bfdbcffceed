//! Property-based tests for the parsing and rendering stages.
//!
//! Covers:
//! 1. Extraction parsing never panics and degrades to `unknown`
//! 2. Pattern extraction and templates keep names out of query text
//! 3. Statement and write-clause scans ignore string literals
//! 4. Template answers are fully grounded in the rows they render
//! 5. Compact rendering respects its row cap

use cinegraph_qa::answer::{ungrounded_terms, TemplateAnswerSynthesizer};
use cinegraph_qa::extractor::{parse_extraction, PatternIntentExtractor};
use cinegraph_qa::synthesizer::{statement_count, write_clauses, TemplateSynthesizer};
use cinegraph_qa::{Intent, ParseOutcome, ResultSet, Row, StructuredQueryIntent};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn person_name() -> impl Strategy<Value = String> {
    ("[A-Z][a-z]{1,8}", "[A-Z][a-z]{1,8}").prop_map(|(first, last)| format!("{first} {last}"))
}

fn intent_tag() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "movie_search",
        "movie_info",
        "person_info",
        "comparison",
        "statistics",
        "unknown",
    ])
}

fn movie_row() -> impl Strategy<Value = Row> {
    ("[A-Z][a-z]{2,10}", 1920i64..2025, 10i64..=100).prop_map(|(title, year, rating)| {
        Row::new()
            .with("movie", title)
            .with("year", year)
            .with("rating", rating as f64 / 10.0)
    })
}

fn movie_rows(max: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(movie_row(), 1..max)
}

// ============================================================================
// Extraction
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn extraction_parse_never_panics(completion in ".{0,200}") {
        let _ = parse_extraction(&completion, "question");
    }

    #[test]
    fn text_without_an_object_is_unparsed(completion in "[^{}]{0,120}") {
        let outcome = parse_extraction(&completion, "question");
        prop_assert!(matches!(outcome, ParseOutcome::Unparsed { .. }), "expected Unparsed outcome");
        prop_assert!(outcome.into_intent("question").is_unknown());
    }

    #[test]
    fn well_formed_extraction_keeps_tag_and_entity(tag in intent_tag(), name in person_name()) {
        let completion = serde_json::json!({
            "intent": tag,
            "entities": {"director": name},
        })
        .to_string();
        let wrapped = format!("Sure! Here is the analysis:\n```json\n{completion}\n```");

        let intent = parse_extraction(&wrapped, "question").into_intent("question");
        prop_assert_eq!(intent.intent, Intent::from_tag(tag));
        prop_assert_eq!(intent.first("director"), Some(name.as_str()));
    }

    #[test]
    fn director_questions_capture_the_full_name(name in person_name()) {
        let extractor = PatternIntentExtractor::new();
        let intent = extractor.match_question(&format!("What movies did {name} direct?"));
        prop_assert_eq!(intent.intent, Intent::PersonInfo);
        prop_assert_eq!(intent.first("director"), Some(name.as_str()));
    }

    #[test]
    fn template_text_does_not_depend_on_entity_values(
        a in "[A-Za-z' .\\-]{1,24}",
        b in "[A-Za-z' .\\-]{1,24}",
    ) {
        prop_assume!(!a.trim().is_empty() && !b.trim().is_empty());
        let synth = TemplateSynthesizer::new();
        let qa = synth
            .plan(&StructuredQueryIntent::new(Intent::PersonInfo, "q").with_entity("actor", a.as_str()))
            .unwrap();
        let qb = synth
            .plan(&StructuredQueryIntent::new(Intent::PersonInfo, "q").with_entity("actor", b.as_str()))
            .unwrap();
        prop_assert_eq!(&qa.text, &qb.text);
        prop_assert_eq!(qa.parameters["param1"].as_str(), Some(a.trim()));
    }
}

// ============================================================================
// Query shape
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn literals_do_not_split_or_write(literal in "[A-Za-z ;]{0,32}") {
        let query = format!("MATCH (m:Movie) WHERE m.name = '{literal}' RETURN m.name");
        prop_assert_eq!(statement_count(&query), 1);
        prop_assert!(write_clauses(&query).is_empty());
    }

    #[test]
    fn semicolons_between_statements_are_counted(n in 1usize..5) {
        let query = vec!["MATCH (m:Movie) RETURN m.name"; n].join(";\n");
        prop_assert_eq!(statement_count(&query), n);
    }

    #[test]
    fn write_keywords_are_found_in_any_case(keyword in prop::sample::select(vec!["create", "merge", "delete", "set", "remove"])) {
        let mixed: String = keyword
            .chars()
            .enumerate()
            .map(|(i, c)| if i % 2 == 0 { c.to_ascii_uppercase() } else { c })
            .collect();
        let query = format!("MATCH (m:Movie) {mixed} (x:Movie)");
        prop_assert_eq!(write_clauses(&query), vec![keyword.to_ascii_uppercase()]);
    }
}

// ============================================================================
// Rendering
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn template_answers_are_grounded(rows in movie_rows(40)) {
        let results = ResultSet::from_rows(rows);
        let answer = TemplateAnswerSynthesizer::new(25).render(&results);
        let ungrounded = ungrounded_terms(&answer.text, "", &results);
        prop_assert!(ungrounded.is_empty(), "ungrounded: {:?} in {}", ungrounded, answer.text);
    }

    #[test]
    fn template_answers_respect_the_row_cap(rows in movie_rows(40), cap in 1usize..30) {
        let results = ResultSet::from_rows(rows);
        let answer = TemplateAnswerSynthesizer::new(cap).render(&results);
        let shown = results.len().min(cap);
        let overflow = usize::from(results.len() > cap);
        prop_assert_eq!(answer.text.lines().count(), shown + overflow);
    }

    #[test]
    fn compact_rendering_caps_rows(rows in movie_rows(40), cap in 0usize..30) {
        let results = ResultSet::from_rows(rows);
        let rendered = results.render_compact(cap);
        let numbered = rendered
            .lines()
            .filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .count();
        prop_assert_eq!(numbered, results.len().min(cap));
        prop_assert_eq!(rendered.contains("more rows not shown"), results.len() > cap);
    }
}
