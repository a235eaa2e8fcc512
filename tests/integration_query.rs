#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use news_rag::RagError;
use news_rag::config::{Config, GenerationProvider, VectorStoreBackend};
use news_rag::database::build_vector_store;
use news_rag::embeddings::build_embedder;
use news_rag::generation::build_generator;
use news_rag::retrieval::QueryEngine;
use news_rag::server::{AnswerResponse, AppState, router};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: usize = 64;

fn query_vector() -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    vector[0] = 1.0;
    vector
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config
        .embeddings
        .ollama
        .set_url(&server.uri())
        .expect("mock server URL is valid");
    config.embeddings.ollama.embedding_dimension = DIMENSION as u32;
    config.generation.provider = GenerationProvider::Ollama;
    config.vector_store.backend = VectorStoreBackend::Pinecone;
    config.vector_store.namespace = Some("cnn".to_string());
    config.vector_store.index_name = Some("news".to_string());
    config.vector_store.index_host = Some(server.uri());
    config.secrets.pinecone_api_key = Some("pc-test".to_string());
    config
}

fn pinecone_match(id: &str, score: f32, text: &str) -> serde_json::Value {
    json!({
        "id": id,
        "score": score,
        "metadata": {
            "text": text,
            "scrape_date": "05/01/2024",
            "section": "business",
            "source": format!("http://cnn.com/{}", id)
        }
    })
}

async fn setup_providers(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [query_vector()] })),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("Api-Key", "pc-test"))
        .and(body_partial_json(json!({
            "namespace": "cnn",
            "topK": 10,
            "includeMetadata": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespace": "cnn",
            "matches": [
                pinecone_match("doc-fed#chunk0", 0.92, "The Fed held rates at 5.25 percent."),
                pinecone_match("doc-jobs#chunk3", 0.71, "Payrolls grew by 175,000 in April."),
                { "id": "doc-bare#chunk0", "score": 0.5 }
            ]
        })))
        .mount(server)
        .await;

    let stream = [
        json!({ "response": "The Fed ", "done": false }),
        json!({ "response": "held rates.", "done": false }),
        json!({ "response": "", "done": true }),
    ]
    .iter()
    .map(|line| format!("{}\n", line))
    .collect::<String>();
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_string(stream))
        .mount(server)
        .await;
}

async fn engine_for(config: &Config) -> QueryEngine {
    let store = build_vector_store(config)
        .await
        .expect("pinecone host is configured");
    QueryEngine::from_config(
        config,
        build_embedder(config).expect("ollama embedder"),
        store,
    )
    .expect("namespace is set")
    .with_generator(build_generator(config).expect("ollama generator"))
}

/// Prompt sent in the most recent generate request
async fn last_prompt(server: &MockServer) -> String {
    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let generate = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/api/generate")
        .expect("a generate request was made");
    let body: serde_json::Value =
        serde_json::from_slice(&generate.body).expect("generate request is JSON");
    body["prompt"]
        .as_str()
        .expect("prompt is a string")
        .to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn prompt_contains_ranked_context() {
    let server = MockServer::start().await;
    setup_providers(&server).await;
    let config = config_for(&server);
    let engine = engine_for(&config).await;

    let prepared = engine
        .prepare_prompt("What did the Fed do?", 1000)
        .await
        .expect("prompt is prepared");

    assert_eq!(prepared.passages.len(), 2);
    assert_eq!(prepared.passages[0].source_id, "doc-fed#chunk0");
    assert_eq!(
        prepared.context,
        "The Fed held rates at 5.25 percent.\nPayrolls grew by 175,000 in April."
    );
    assert!(prepared.prompt.starts_with("Human: Answer the following QUESTION"));
    assert!(prepared.prompt.ends_with("Assistant:\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn answer_streams_from_generator() {
    let server = MockServer::start().await;
    setup_providers(&server).await;
    let config = config_for(&server);
    let engine = engine_for(&config).await;

    let tokens = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    let answer = engine
        .answer("What did the Fed do?", 40, move |token| {
            sink.lock().expect("lock").push(token.to_string());
        })
        .await
        .expect("answer succeeds");

    assert_eq!(answer, "The Fed held rates.");
    assert_eq!(
        *tokens.lock().expect("lock"),
        vec!["The Fed ".to_string(), "held rates.".to_string()]
    );

    // Only the first passage fits into 40 characters
    let prompt = last_prompt(&server).await;
    assert!(prompt.contains("CONTEXT:\nThe Fed held rates at 5.25 percent.\n"));
    assert!(!prompt.contains("Payrolls"));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_pinecone_key_is_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .with_priority(1)
        .mount(&server)
        .await;
    setup_providers(&server).await;
    let config = config_for(&server);
    let engine = engine_for(&config).await;

    match engine.search("Fed?").await {
        Err(RagError::Provider(e)) => {
            assert!(e.is_permission_denied());
            assert!(e.remediation().is_some());
        }
        other => panic!("expected a permission error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn http_endpoint_answers_questions() {
    let server = MockServer::start().await;
    setup_providers(&server).await;
    let config = config_for(&server);
    let app = router(
        AppState {
            engine: engine_for(&config).await,
            max_context_chars: config.server.max_context_chars,
        },
        None,
    );

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind an ephemeral port");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });

    let url = format!("http://{}/submit-question", addr);
    let (status, body) = tokio::task::spawn_blocking(move || {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        let mut response = agent
            .post(&url)
            .header("Content-Type", "application/json")
            .send(r#"{"question": "What did the Fed do?"}"#)
            .expect("request reaches the server");
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .expect("body is readable");
        (status, body)
    })
    .await
    .expect("request task completes");

    assert_eq!(status, 200);
    let response: AnswerResponse = serde_json::from_str(&body).expect("answer JSON");
    assert_eq!(response.answer, "The Fed held rates.");

    let prompt = last_prompt(&server).await;
    assert!(prompt.contains("QUESTION:\nWhat did the Fed do?\n"));
    assert!(prompt.contains("Payrolls grew by 175,000 in April."));
}
