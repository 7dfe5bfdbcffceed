//! Integration tests for the complete question-answering pipeline
//!
//! These tests drive `QaService` end to end with scripted doubles:
//! - Question → pattern extraction → template query → rows → template answer
//! - Question → LLM extraction → LLM query → rows → grounded LLM answer
//! - Failure codes at the `Reply` boundary
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use cinegraph_qa::graph::{GraphError, GraphRows, GraphValue};
use cinegraph_qa::testing::{ScriptedGraph, ScriptedLlm};
use cinegraph_qa::{AnswerSource, Intent, Mode, QaService, SchemaDescriptor, NO_INFORMATION};
use serde_json::json;

fn service(graph: &Arc<ScriptedGraph>) -> QaService {
    QaService::builder(graph.clone()).build()
}

fn listing(rows: &[(&str, i64, f64)]) -> GraphRows {
    rows.iter().fold(
        GraphRows::new(vec!["movie".into(), "year".into(), "rating".into()]),
        |acc, (movie, year, rating)| acc.with_row(vec![(*movie).into(), (*year).into(), (*rating).into()]),
    )
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_movie_schema_describes_every_label_and_relationship() {
    let text = SchemaDescriptor::movie_graph().describe();

    for label in ["Movie", "Person", "Genre"] {
        assert!(text.contains(&format!("- {label} (properties:")), "{label} missing");
    }
    for rel in [
        "(Person)-[:DIRECTED]->(Movie)",
        "(Person)-[:ACTED_IN]->(Movie)",
        "(Person)-[:WROTE]->(Movie)",
        "(Movie)-[:BELONGS_TO]->(Genre)",
    ] {
        assert!(text.contains(rel), "{rel} missing");
    }
    assert_eq!(text, SchemaDescriptor::movie_graph().describe());
}

// ============================================================================
// Direct mode: one question per template
// ============================================================================

#[tokio::test]
async fn test_movie_info_renders_a_card() {
    let rows = GraphRows::new(
        ["movie", "year", "rating", "certificate", "runtime", "directors", "actors", "genres"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
    .with_row(vec![
        "Inception".into(),
        2010.into(),
        8.8.into(),
        "PG-13".into(),
        "148 min".into(),
        GraphValue::List(vec!["Christopher Nolan".into()]),
        GraphValue::List(vec!["Leonardo DiCaprio".into(), "Elliot Page".into()]),
        GraphValue::List(vec!["Action".into(), "Sci-Fi".into()]),
    ]);
    let graph = Arc::new(ScriptedGraph::new().with_rows(rows));

    let answer = service(&graph)
        .answer("Tell me about the movie Inception", Mode::Direct)
        .await
        .unwrap();

    assert_eq!(
        answer.text,
        "Movie: Inception (2010)\n\
         Rating: 8.8\n\
         Certificate: PG-13\n\
         Runtime: 148 min\n\
         Directors: Christopher Nolan\n\
         Genres: Action, Sci-Fi\n\
         Actors: Leonardo DiCaprio, Elliot Page"
    );
    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("OPTIONAL MATCH (m)-[:BELONGS_TO]->(g:Genre)"));
    assert_eq!(params["param1"], json!("Inception"));
}

#[tokio::test]
async fn test_comparison_binds_every_title() {
    let graph = Arc::new(
        ScriptedGraph::new().with_rows(listing(&[("Interstellar", 2014, 8.7), ("Inception", 2010, 8.8)])),
    );

    let answer = service(&graph)
        .answer("Compare Inception and Interstellar", Mode::Direct)
        .await
        .unwrap();

    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("WHERE m.name IN $titles"));
    assert_eq!(params["titles"], json!(["Inception", "Interstellar"]));
    assert!(answer.text.contains("Interstellar (2014) - Rating: 8.7"));
}

#[tokio::test]
async fn test_top_rated_by_year() {
    let graph = Arc::new(ScriptedGraph::new().with_rows(listing(&[("Inception", 2010, 8.8)])));

    service(&graph)
        .answer("What are the top rated movies of 2010?", Mode::Direct)
        .await
        .unwrap();

    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("LIMIT 10"));
    assert_eq!(params["year"], json!(2010));
}

#[tokio::test]
async fn test_genre_listing() {
    let graph = Arc::new(ScriptedGraph::new().with_rows(listing(&[("Superbad", 2007, 7.6)])));

    let answer = service(&graph)
        .answer("Show me the best comedy movies", Mode::Direct)
        .await
        .unwrap();

    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("toLower(g.name) = toLower($param1)"));
    assert_eq!(params["param1"], json!("comedy"));
    assert_eq!(answer.text, "Superbad (2007) - Rating: 7.6");
}

#[tokio::test]
async fn test_count_question_is_filtered_by_the_director() {
    let graph = Arc::new(ScriptedGraph::new().with_rows(listing(&[("Inception", 2010, 8.8)])));

    service(&graph)
        .answer("How many movies did Christopher Nolan direct?", Mode::Direct)
        .await
        .unwrap();

    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("(p:Person)-[:DIRECTED]->(m:Movie)"));
    assert!(!query.contains("LIMIT 10"), "fell back to the unfiltered ranking");
    assert_eq!(params["param1"], json!("Christopher Nolan"));
}

#[tokio::test]
async fn test_genre_search_binds_the_year() {
    let graph = Arc::new(ScriptedGraph::new());
    let llm = Arc::new(ScriptedLlm::new().with_reply(
        r#"{"intent": "movie_search", "entities": {"genre": "crime", "year": "1994"}}"#,
    ));
    let service = QaService::builder(graph.clone())
        .completion(llm.clone())
        .build();

    let answer = service
        .answer("Show me the best crime movies from 1994", Mode::Direct)
        .await
        .unwrap();

    assert_eq!(answer.source, AnswerSource::NoResults);
    let executed = graph.executed_with_params();
    let (query, params) = &executed[0];
    assert!(query.contains("m.year = $year"));
    assert_eq!(params["param1"], json!("crime"));
    assert_eq!(params["year"], json!(1994));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_empty_rows_in_direct_mode() {
    let graph = Arc::new(ScriptedGraph::new());

    let answer = service(&graph)
        .answer("Show me movies starring Nobody Atall", Mode::Direct)
        .await
        .unwrap();

    assert_eq!(answer.text, NO_INFORMATION);
    assert_eq!(answer.source, AnswerSource::NoResults);
    assert_eq!(graph.executed().len(), 1);
}

// ============================================================================
// LLM mode
// ============================================================================

#[tokio::test]
async fn test_llm_mode_round_trip_with_list_entities() {
    let graph = Arc::new(
        ScriptedGraph::new().with_rows(listing(&[("Heat", 1995, 8.3), ("Collateral", 2004, 7.5)])),
    );
    let llm = Arc::new(
        ScriptedLlm::new()
            .with_reply(
                r#"{"primary_intent": "comparison", "entities": [{"type": "movie", "value": "Heat"}, {"type": "movie", "value": "Collateral"}]}"#,
            )
            .with_reply("Cypher:\nMATCH (m:Movie) WHERE m.name IN ['Heat', 'Collateral']\nRETURN m.name AS movie, m.year AS year, m.rating AS rating"),
    );
    llm.push_reply("Heat (1995) is rated 8.3, ahead of Collateral (2004) at 7.5.");
    let service = QaService::builder(graph.clone())
        .completion(llm.clone())
        .build();

    let run = service.run("Compare Heat and Collateral", Mode::Llm).await;
    let answer = run.result.unwrap();

    let intent = run.trace.intent.unwrap();
    assert_eq!(intent.intent, Intent::Comparison);
    assert_eq!(intent.all("movie_title"), vec!["Heat", "Collateral"]);
    assert_eq!(
        graph.executed()[0],
        "MATCH (m:Movie) WHERE m.name IN ['Heat', 'Collateral']\nRETURN m.name AS movie, m.year AS year, m.rating AS rating"
    );
    assert_eq!(answer.source, AnswerSource::Llm);
    assert!(answer.text.starts_with("Heat (1995)"));

    let requests = llm.requests();
    let answer_prompt = &requests[2];
    assert!(answer_prompt.user().contains("Heat"));
    assert!(answer_prompt.user().contains("8.3"));
}

// ============================================================================
// Reply boundary
// ============================================================================

#[tokio::test]
async fn test_reply_codes() {
    let runtime_failure = Arc::new(
        ScriptedGraph::new()
            .with_run_error(GraphError::Runtime("Java heap space".into()))
            .with_run_error(GraphError::Runtime("Java heap space".into())),
    );
    let reply = service(&runtime_failure)
        .respond("What movies did Christopher Nolan direct?", Mode::Direct)
        .await;
    assert_eq!(reply.failure_code, Some("query_runtime_error"));
    assert!(reply.source.is_none());
    assert!(!reply.text.contains("heap"), "internal detail leaked: {}", reply.text);

    let unsupported = service(&Arc::new(ScriptedGraph::new()))
        .respond("Sing me a song", Mode::Direct)
        .await;
    assert_eq!(unsupported.failure_code, Some("unsupported_intent"));

    let no_llm = service(&Arc::new(ScriptedGraph::new()))
        .respond("Sing me a song", Mode::Llm)
        .await;
    assert_eq!(no_llm.failure_code, Some("llm_unavailable"));
}

#[test]
fn test_modes_parse_from_cli_spellings() {
    assert_eq!("direct".parse::<Mode>().unwrap(), Mode::Direct);
    assert_eq!("LLM".parse::<Mode>().unwrap(), Mode::Llm);
    assert!("both".parse::<Mode>().is_err());
}
