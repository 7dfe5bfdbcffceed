//! HTTP client tests against a local mock server.
//!
//! Covers:
//! 1. OpenAI, Anthropic and local chat completion request/response shapes
//! 2. Provider error mapping (rate limits, server errors)
//! 3. Neo4j transactional endpoint decoding and error classification
//! 4. A direct-mode question answered through the Neo4j client

use cinegraph_qa::llm::{CompletionOptions, CompletionProvider, CompletionRequest, LlmError};
use mockito::Matcher;
use serde_json::json;

fn request() -> CompletionRequest {
    CompletionRequest::new(
        "You are a Cypher query generator.",
        "Question: What movies did Christopher Nolan direct?",
        CompletionOptions::new(256, 0.0),
    )
}

// ============================================================================
// Completion providers
// ============================================================================

#[cfg(feature = "openai")]
mod openai {
    use super::*;
    use cinegraph_qa::llm::providers::OpenAIClient;
    use cinegraph_qa::LlmConfig;

    fn client(server: &mockito::ServerGuard) -> OpenAIClient {
        let config = LlmConfig::openai("sk-test", "gpt-4o-mini").with_base_url(&server.url());
        OpenAIClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_reads_the_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 256,
                "messages": [
                    {"role": "system", "content": "You are a Cypher query generator."},
                    {"role": "user", "content": "Question: What movies did Christopher Nolan direct?"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "model": "gpt-4o-mini-2024-07-18",
                    "choices": [{
                        "message": {"role": "assistant", "content": "MATCH (m:Movie) RETURN m.name"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 42, "completion_tokens": 9}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let response = client(&server).complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "MATCH (m:Movie) RETURN m.name");
        assert_eq!(response.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(response.usage.prompt_tokens, 42);
        assert_eq!(response.usage.completion_tokens, 9);
    }

    #[tokio::test]
    async fn json_mode_requests_a_json_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_body(
                json!({"choices": [{"message": {"content": "{\"intent\": \"unknown\"}"}}]}).to_string(),
            )
            .create_async()
            .await;

        let response = client(&server).complete(request().json()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "{\"intent\": \"unknown\"}");
    }

    #[tokio::test]
    async fn rate_limits_carry_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let err = client(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_ms: 7000 }));
    }

    #[tokio::test]
    async fn server_errors_become_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let err = client(&server).complete(request()).await.unwrap_err();
        assert!(matches!(&err, LlmError::Api(msg) if msg.contains("upstream exploded")));
        let err: cinegraph_qa::QaError = err.into();
        assert_eq!(err.code(), "llm_unavailable");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        assert!(OpenAIClient::new(LlmConfig::openai("", "gpt-4o-mini")).is_err());
    }
}

#[cfg(feature = "anthropic")]
mod anthropic {
    use super::*;
    use cinegraph_qa::llm::providers::AnthropicClient;
    use cinegraph_qa::LlmConfig;

    #[tokio::test]
    async fn system_prompt_is_a_top_level_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "ak-test")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({
                "system": "You are a Cypher query generator.",
                "max_tokens": 256,
                "messages": [
                    {"role": "user", "content": "Question: What movies did Christopher Nolan direct?"}
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "content": [
                        {"type": "text", "text": "MATCH (m:Movie) "},
                        {"type": "text", "text": "RETURN m.name"}
                    ],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 30, "output_tokens": 6}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let config = LlmConfig::anthropic("ak-test", "claude-3-5-haiku-latest")
            .with_base_url(&server.url());
        let response = AnthropicClient::new(config)
            .unwrap()
            .complete(request())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "MATCH (m:Movie) RETURN m.name");
        assert_eq!(response.usage.prompt_tokens, 30);
    }
}

#[cfg(feature = "local")]
mod local {
    use super::*;
    use cinegraph_qa::llm::providers::LocalClient;
    use cinegraph_qa::LlmConfig;

    #[tokio::test]
    async fn posts_to_the_openai_compatible_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(json!({"model": "llama3.2"})))
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"content": "Inception (2010)"}}]}).to_string())
            .create_async()
            .await;

        let base = format!("{}/", server.url());
        let client = LocalClient::new(LlmConfig::local(&base, "llama3.2")).unwrap();
        let response = client.complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Inception (2010)");
        assert_eq!(response.model, "llama3.2");
    }

    #[tokio::test]
    async fn missing_content_is_an_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(json!({"choices": []}).to_string())
            .create_async()
            .await;

        let client = LocalClient::new(LlmConfig::local(&server.url(), "llama3.2")).unwrap();
        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}

// ============================================================================
// Neo4j HTTP
// ============================================================================

#[cfg(feature = "neo4j-http")]
mod neo4j {
    use super::*;
    use cinegraph_qa::graph::neo4j::Neo4jHttpEngine;
    use cinegraph_qa::graph::{GraphEngine, GraphError, GraphValue, Params};
    use cinegraph_qa::{GraphConfig, Mode, QaService};
    use std::sync::Arc;

    const TX_PATH: &str = "/db/neo4j/tx/commit";

    fn engine(server: &mockito::ServerGuard, password: Option<&str>) -> Neo4jHttpEngine {
        let config = GraphConfig {
            url: server.url(),
            password: password.map(str::to_string),
            ..GraphConfig::default()
        };
        Neo4jHttpEngine::new(config).unwrap()
    }

    fn nolan_body() -> String {
        json!({
            "results": [{
                "columns": ["movie", "year", "rating"],
                "data": [
                    {"row": ["Inception", 2010, 8.8], "meta": [null, null, null]},
                    {"row": ["Memento", 2000, 8.4], "meta": [null, null, null]}
                ]
            }],
            "errors": []
        })
        .to_string()
    }

    #[tokio::test]
    async fn run_posts_one_statement_with_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TX_PATH)
            .match_header("authorization", "Basic bmVvNGo6c2VjcmV0")
            .match_body(Matcher::PartialJson(json!({
                "statements": [{
                    "statement": "MATCH (m:Movie) WHERE m.name = $param1 RETURN m.name AS movie",
                    "parameters": {"param1": "Inception"},
                    "resultDataContents": ["row", "graph"]
                }]
            })))
            .with_status(200)
            .with_body(nolan_body())
            .create_async()
            .await;

        let mut params = Params::new();
        params.insert("param1".into(), json!("Inception"));
        let rows = engine(&server, Some("secret"))
            .run(
                "MATCH (m:Movie) WHERE m.name = $param1 RETURN m.name AS movie",
                &params,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows.columns, vec!["movie", "year", "rating"]);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0][0], GraphValue::String("Inception".into()));
        assert_eq!(rows.rows[0][1], GraphValue::Int(2010));
    }

    #[tokio::test]
    async fn nodes_keep_their_labels() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TX_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "results": [{
                        "columns": ["p"],
                        "data": [{
                            "row": [{"name": "Christopher Nolan"}],
                            "meta": [{"id": 7, "type": "node", "deleted": false}],
                            "graph": {"nodes": [{"id": "7", "labels": ["Person"], "properties": {}}], "relationships": []}
                        }]
                    }],
                    "errors": []
                })
                .to_string(),
            )
            .create_async()
            .await;

        let rows = engine(&server, None)
            .run("MATCH (p:Person) RETURN p LIMIT 1", &Params::new())
            .await
            .unwrap();

        let GraphValue::Node(node) = &rows.rows[0][0] else {
            panic!("expected a node, got {:?}", rows.rows[0][0]);
        };
        assert_eq!(node.labels, vec!["Person"]);
        assert_eq!(
            node.properties.get("name"),
            Some(&GraphValue::String("Christopher Nolan".into()))
        );
    }

    #[tokio::test]
    async fn syntax_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TX_PATH)
            .with_status(200)
            .with_body(
                json!({
                    "results": [],
                    "errors": [{
                        "code": "Neo.ClientError.Statement.SyntaxError",
                        "message": "Invalid input 'RETRUN'"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = engine(&server, None)
            .validate("MATCH (m:Movie) RETRUN m", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, GraphError::Syntax(msg) if msg.contains("RETRUN")));
    }

    #[tokio::test]
    async fn validation_prefixes_explain() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", TX_PATH)
            .match_body(Matcher::PartialJson(json!({
                "statements": [{"statement": "EXPLAIN MATCH (m:Movie) RETURN m.name"}]
            })))
            .with_status(200)
            .with_body(json!({"results": [{"columns": ["m.name"], "data": []}], "errors": []}).to_string())
            .create_async()
            .await;

        engine(&server, None)
            .validate("MATCH (m:Movie) RETURN m.name", &Params::new())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_credentials_are_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", TX_PATH)
            .with_status(401)
            .create_async()
            .await;

        let err = engine(&server, Some("wrong"))
            .run("RETURN 1", &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Unavailable(_)));
        let err: cinegraph_qa::QaError = err.into();
        assert_eq!(err.code(), "query_runtime_error");
    }

    #[tokio::test]
    async fn direct_question_through_neo4j() {
        let mut server = mockito::Server::new_async().await;
        // EXPLAIN and the real run share the endpoint.
        let mock = server
            .mock("POST", TX_PATH)
            .with_status(200)
            .with_body(nolan_body())
            .expect(2)
            .create_async()
            .await;

        let service = QaService::builder(Arc::new(engine(&server, None))).build();
        let reply = service
            .respond("What movies did Christopher Nolan direct?", Mode::Direct)
            .await;

        mock.assert_async().await;
        assert!(!reply.is_failure(), "{reply:?}");
        assert_eq!(
            reply.text,
            "Inception (2010) - Rating: 8.8\nMemento (2000) - Rating: 8.4"
        );
    }
}
