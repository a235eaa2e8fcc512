use super::*;
use crate::database::{VectorMetadata, VectorRecord};
use crate::testutil::{CountingEmbedder, MemoryStore, ScriptedGenerator, count_vector};
use std::sync::Mutex;

fn record(id: &str, text: &str) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        values: count_vector(text),
        metadata: VectorMetadata {
            text: text.to_string(),
            scrape_date: "05/01/2024".to_string(),
            section: "world".to_string(),
            source: format!("http://cnn.com/{}", id),
        },
    }
}

fn scored(id: &str, score: f32, text: Option<&str>) -> ScoredMatch {
    ScoredMatch {
        id: id.to_string(),
        score,
        metadata: text.map(|t| record(id, t).metadata),
    }
}

async fn engine_with(records: &[VectorRecord]) -> QueryEngine {
    let store = MemoryStore::default();
    store
        .upsert("cnn", records)
        .await
        .expect("memory upsert succeeds");
    QueryEngine::new(Arc::new(CountingEmbedder::default()), Arc::new(store), "cnn")
}

#[test]
fn passages_keep_rank_order() {
    let passages = passages_from_matches(vec![
        scored("a", 0.9, Some("first")),
        scored("b", 0.7, None),
        scored("c", 0.5, Some("second")),
    ]);

    assert_eq!(
        passages,
        vec![
            Passage {
                text: "first".to_string(),
                rank: 0,
                source_id: "a".to_string(),
                score: 0.9,
            },
            Passage {
                text: "second".to_string(),
                rank: 1,
                source_id: "c".to_string(),
                score: 0.5,
            },
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_query_is_rejected() {
    let engine = engine_with(&[]).await;
    assert!(matches!(
        engine.embed_query("   ").await,
        Err(RagError::InvalidArgument(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn search_orders_by_similarity() {
    let engine = engine_with(&[
        record("digits", "2024 1999 42"),
        record("vowels", "aeiou eia"),
        record("mixed", "rates 2024"),
    ])
    .await
    .with_top_k(2);

    let matches = engine.search("12345").await.expect("search succeeds");
    let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["digits", "mixed"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn prompt_packs_context_within_budget() {
    let engine = engine_with(&[
        record("long", "1234567890 1234567890"),
        record("short", "12 ab"),
    ])
    .await;

    let prepared = engine
        .prepare_prompt("99", 21)
        .await
        .expect("prompt is prepared");

    assert_eq!(prepared.passages.len(), 2);
    assert_eq!(prepared.context, "1234567890 1234567890");
    assert!(prepared.prompt.contains("QUESTION:\n99\n\nCONTEXT:\n1234567890 1234567890\n"));

    let roomy = engine
        .prepare_prompt("99", 100)
        .await
        .expect("prompt is prepared");
    assert_eq!(roomy.context, "1234567890 1234567890\n12 ab");
}

#[tokio::test(flavor = "multi_thread")]
async fn answer_streams_tokens() {
    let generator = Arc::new(ScriptedGenerator::new("The Fed held rates."));
    let engine = engine_with(&[record("a", "Fed 2024")])
        .await
        .with_generator(Arc::clone(&generator) as Arc<dyn Generator>);

    let tokens = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    let answer = engine
        .answer("What did the Fed do?", 1000, move |t| {
            sink.lock().expect("lock").push(t.to_string());
        })
        .await
        .expect("answer succeeds");

    assert_eq!(answer, "The Fed held rates.");
    assert_eq!(tokens.lock().expect("lock").concat(), answer);

    let prompts = generator.prompts.lock().expect("lock");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("CONTEXT:\nFed 2024\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn answer_requires_generator() {
    let engine = engine_with(&[]).await;
    assert!(matches!(
        engine.answer("question", 1000, |_| {}).await,
        Err(RagError::Config(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn from_config_needs_namespace() {
    let mut config = Config::default();
    let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::default());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::default());

    assert!(QueryEngine::from_config(&config, Arc::clone(&embedder), Arc::clone(&store)).is_err());

    config.vector_store.namespace = Some("cnn".to_string());
    config.retrieval.top_k = 3;
    let engine = QueryEngine::from_config(&config, embedder, store).expect("namespace is set");
    assert_eq!(engine.namespace(), "cnn");
}
