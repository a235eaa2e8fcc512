use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.secrets.pinecone_api_key = Some("pc-test".to_string());
    config.vector_store.index_name = Some("news".to_string());
    config.vector_store.namespace = Some("cnn".to_string());
    config.vector_store.index_host = Some(server.uri());
    config
}

async fn store_for(server: &MockServer) -> PineconeStore {
    PineconeStore::connect(&config_for(server))
        .await
        .expect("host is configured")
        .with_backoff_unit(Duration::from_millis(1))
}

fn record(id: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        values: vec![0.25, 0.5],
        metadata: VectorMetadata {
            text: format!("text {}", id),
            scrape_date: "05/01/2024".to_string(),
            section: "world".to_string(),
            source: "http://cnn.com/a".to_string(),
        },
    }
}

#[test]
fn host_gets_https_scheme() {
    assert_eq!(
        normalize_host("news-abc.svc.pinecone.io"),
        "https://news-abc.svc.pinecone.io"
    );
    assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
}

#[tokio::test(flavor = "multi_thread")]
async fn resolves_host_through_control_plane() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/news"))
        .and(header("Api-Key", "pc-test"))
        .and(header("X-Pinecone-API-Version", "2025-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "news",
            "dimension": 768,
            "host": "news-abc.svc.pinecone.io"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.vector_store.index_host = None;
    config.vector_store.control_plane_url = server.uri();

    let store = PineconeStore::connect(&config)
        .await
        .expect("host should resolve");
    assert_eq!(store.host(), "https://news-abc.svc.pinecone.io");
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_sends_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(header("Api-Key", "pc-test"))
        .and(body_partial_json(json!({"namespace": "cnn"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 2})))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.vector_store.upsert_batch_size = 2;
    let store = PineconeStore::connect(&config)
        .await
        .expect("host is configured");

    let records = vec![record("a"), record("b"), record("c"), record("d")];
    let upserted = store
        .upsert("cnn", &records)
        .await
        .expect("upsert should succeed");
    assert_eq!(upserted, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_body_carries_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_json(json!({
            "vectors": [{
                "id": "a",
                "values": [0.25, 0.5],
                "metadata": {
                    "text": "text a",
                    "scrape_date": "05/01/2024",
                    "section": "world",
                    "source": "http://cnn.com/a"
                }
            }],
            "namespace": "cnn"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_eq!(
        store
            .upsert("cnn", &[record("a")])
            .await
            .expect("upsert should succeed"),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn query_orders_by_score_and_keeps_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "namespace": "cnn",
            "topK": 3,
            "includeMetadata": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespace": "cnn",
            "matches": [
                {"id": "low", "score": 0.1, "metadata": {"text": "partial"}},
                {"id": "high", "score": 0.9, "metadata": {
                    "text": "text high",
                    "scrape_date": "05/01/2024",
                    "section": "world",
                    "source": "http://cnn.com/a"
                }},
                {"id": "mid", "score": 0.5}
            ]
        })))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let matches = store
        .query("cnn", &[0.1, 0.2], 3)
        .await
        .expect("query should succeed");

    let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["high", "mid", "low"]);
    assert_eq!(
        matches[0].metadata.as_ref().map(|m| m.text.as_str()),
        Some("text high")
    );
    assert!(matches[1].metadata.is_none());
    assert!(matches[2].metadata.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_namespace_sends_delete_all() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .and(body_json(json!({"deleteAll": true, "namespace": "cnn"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    store
        .delete_namespace("cnn")
        .await
        .expect("delete should succeed");
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_missing_namespace_is_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/delete"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"code": 5, "message": "Namespace not found"})),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    store
        .delete_namespace("cnn")
        .await
        .expect("missing namespace is not an error");
}

#[tokio::test(flavor = "multi_thread")]
async fn count_reads_namespace_stats() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespaces": {
                "cnn": {"vectorCount": 42},
                "other": {"vectorCount": 7}
            },
            "dimension": 768,
            "totalVectorCount": 49
        })))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_eq!(store.count("cnn").await.expect("count should succeed"), 42);
    assert_eq!(store.count("absent").await.expect("count should succeed"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_key_is_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Key"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    match store.query("cnn", &[0.1], 1).await {
        Err(RagError::Provider(error)) => {
            assert!(error.is_permission_denied());
            assert!(error.remediation().is_some_and(|h| h.contains("PINECONE_API_KEY")));
        }
        other => panic!("expected permission error, got {:?}", other),
    }
}
