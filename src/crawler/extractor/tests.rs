use super::*;

fn url(s: &str) -> Url {
    Url::parse(s).expect("url should parse")
}

fn page_with_ld_json(blocks: &[&str]) -> String {
    let scripts: String = blocks
        .iter()
        .map(|b| format!(r#"<script type="application/ld+json">{}</script>"#, b))
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>Story</title>{}</head><body><p>ignored</p></body></html>",
        scripts
    )
}

#[test]
fn article_id_matches_cnn_url_shape() {
    assert_eq!(
        article_id(&url(
            "http://cnn.com/2024/05/01/world/flood-warning/index.html"
        )),
        "2024_05_01_world_flood-warning"
    );
    assert_eq!(
        article_id(&url("http://cnn.com/2024/05/01/politics/debate/")),
        "2024_05_01_politics_debate"
    );
    assert_eq!(
        article_id(&url("https://www.cnn.com/business/markets")),
        "business_markets"
    );
    assert_eq!(article_id(&url("http://cnn.com/")), "cnn.com");
}

#[test]
fn article_id_is_stable() {
    let source = url("http://cnn.com/2024/06/11/business/earnings/index.html");
    let first = article_id(&source);
    for _ in 0..5 {
        assert_eq!(article_id(&source), first);
    }
}

#[test]
fn vector_ids_follow_chunk_format() {
    assert_eq!(vector_id("2024_05_01_world_x", 0), "doc-2024_05_01_world_x#chunk0");
    assert_eq!(vector_id("abc", 12), "doc-abc#chunk12");
}

#[test]
fn document_chunks_carry_parent_id() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 7).expect("valid date");
    let document = Document::new(
        url("http://cnn.com/2024/03/07/world/story/index.html"),
        "ABCDEFGHIJ".to_string(),
        date,
    );

    assert_eq!(document.source_id, "2024_03_07_world_story");
    assert_eq!(document.scrape_date(), "03/07/2024");

    let chunks = document
        .chunk(&ChunkingConfig {
            window_size: 4,
            overlap: 1,
        })
        .expect("valid chunking config");

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[2].text, "GHIJ");
    assert_eq!(chunks[2].char_start, 6);
    assert_eq!(chunks[3].vector_id(), "doc-2024_03_07_world_story#chunk3");
    assert!(chunks.iter().all(|c| c.parent_source_id == document.source_id));
}

#[test]
fn duplicate_windows_keep_distinct_ids() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let document = Document::new(url("http://cnn.com/a/b"), "xxxxxxxx".to_string(), date);
    let chunks = document
        .chunk(&ChunkingConfig {
            window_size: 2,
            overlap: 0,
        })
        .expect("valid chunking config");

    let ids: Vec<String> = chunks.iter().map(Chunk::vector_id).collect();
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(unique.len(), 4);
}

#[test]
fn invalid_chunking_config_is_rejected() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
    let document = Document::new(url("http://cnn.com/a/b"), "text".to_string(), date);
    let result = document.chunk(&ChunkingConfig {
        window_size: 5,
        overlap: 5,
    });
    assert!(matches!(result, Err(crate::RagError::InvalidArgument(_))));
}

#[test]
fn extracts_article_body_from_object() {
    let html = page_with_ld_json(&[
        r#"{"@type":"NewsArticle","headline":"Storm","articleBody":"Heavy rain fell."}"#,
    ]);
    let body = extract_article_body(&html, &url("http://cnn.com/storm"))
        .expect("article body should be found");
    assert_eq!(body, "Heavy rain fell.");
}

#[test]
fn extracts_article_body_from_array_and_graph() {
    let html = page_with_ld_json(&[
        r#"[{"@type":"WebPage"},{"@type":"NewsArticle","articleBody":"From array."}]"#,
    ]);
    let body =
        extract_article_body(&html, &url("http://cnn.com/a")).expect("body in array form");
    assert_eq!(body, "From array.");

    let html = page_with_ld_json(&[
        r#"{"@context":"https://schema.org","@graph":[{"@type":"NewsArticle","articleBody":"From graph."}]}"#,
    ]);
    let body =
        extract_article_body(&html, &url("http://cnn.com/b")).expect("body in graph form");
    assert_eq!(body, "From graph.");
}

#[test]
fn skips_blocks_without_body() {
    let html = page_with_ld_json(&[
        r#"{"@type":"BreadcrumbList"}"#,
        r#"{"@type":"NewsArticle","articleBody":"Second block."}"#,
    ]);
    let body = extract_article_body(&html, &url("http://cnn.com/c")).expect("second block");
    assert_eq!(body, "Second block.");
}

#[test]
fn missing_structured_content_is_reported() {
    let html = "<html><body><p>No structured data here</p></body></html>";
    let result = extract_article_body(html, &url("http://cnn.com/d"));
    assert!(matches!(result, Err(FetchError::MissingContent { .. })));

    let html = page_with_ld_json(&[r#"{"@type":"VideoObject","name":"clip"}"#]);
    let result = extract_article_body(&html, &url("http://cnn.com/e"));
    assert!(matches!(result, Err(FetchError::MissingContent { .. })));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let html = page_with_ld_json(&[r#"{"articleBody": "unterminated"#]);
    let result = extract_article_body(&html, &url("http://cnn.com/f"));
    assert!(matches!(result, Err(FetchError::Parse { .. })));
}
