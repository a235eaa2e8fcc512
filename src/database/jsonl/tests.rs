use super::*;
use crate::database::VectorMetadata;
use serde_json::json;
use tempfile::TempDir;

fn record(id: &str, values: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        values,
        metadata: VectorMetadata {
            text: format!("text of {}", id),
            scrape_date: "05/01/2024".to_string(),
            section: "world".to_string(),
            source: "http://cnn.com/2024/05/01/world/story/index.html".to_string(),
        },
    }
}

#[test]
fn section_file_names() {
    assert_eq!(section_file_name("world"), "cnn_articles_world.jsonl");
    assert_eq!(section_file_name("business"), "cnn_articles_business.jsonl");
}

#[test]
fn line_format_uses_exact_field_names() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");

    let written = write_records(&path, &[record("doc-a#chunk0", vec![0.5, -1.0])])
        .expect("should write records");
    assert_eq!(written, 1);

    let content = std::fs::read_to_string(&path).expect("should read file");
    assert!(content.ends_with('\n'));
    let value: serde_json::Value =
        serde_json::from_str(content.trim_end()).expect("line is JSON");
    assert_eq!(
        value,
        json!({
            "id": "doc-a#chunk0",
            "values": [0.5, -1.0],
            "metadata": {
                "text": "text of doc-a#chunk0",
                "scrape_date": "05/01/2024",
                "section": "world",
                "source": "http://cnn.com/2024/05/01/world/story/index.html"
            }
        })
    );

    let read = read_records(&path).expect("should read records back");
    assert_eq!(read, vec![record("doc-a#chunk0", vec![0.5, -1.0])]);
}

#[test]
fn writing_replaces_previous_content() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("nested").join("out.jsonl");

    write_records(&path, &[record("a", vec![1.0]), record("b", vec![2.0])])
        .expect("first write");
    write_records(&path, &[record("c", vec![3.0])]).expect("second write");

    let ids: Vec<_> = read_records(&path)
        .expect("should read")
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["c"]);
}

#[test]
fn writer_counts_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");

    let mut writer = JsonlWriter::create(&path).expect("should create writer");
    assert_eq!(writer.written(), 0);
    writer.write(&record("a", vec![1.0])).expect("write a");
    writer.write(&record("b", vec![2.0])).expect("write b");
    assert_eq!(writer.finish().expect("should flush"), 2);
}

#[test]
fn previous_file_survives_until_finish() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");
    write_records(&path, &[record("old", vec![1.0])]).expect("first write");

    let mut writer = JsonlWriter::create(&path).expect("should create writer");
    writer.write(&record("new", vec![2.0])).expect("write new");

    let ids = |p: &Path| -> Vec<String> {
        read_records(p)
            .expect("should read")
            .into_iter()
            .map(|r| r.id)
            .collect()
    };
    assert_eq!(ids(&path), vec!["old"]);
    assert!(temp_path(&path).exists());

    writer.finish().expect("should finish");
    assert_eq!(ids(&path), vec!["new"]);
    assert!(!temp_path(&path).exists());
}

#[test]
fn abandoned_writer_leaves_previous_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");
    write_records(&path, &[record("old", vec![1.0])]).expect("first write");

    {
        let mut writer = JsonlWriter::create(&path).expect("should create writer");
        writer.write(&record("new", vec![2.0])).expect("write new");
    }

    let records = read_records(&path).expect("should read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "old");
    assert_eq!(
        list_jsonl_files(temp_dir.path()).expect("should list"),
        vec![path.clone()]
    );
}

#[test]
fn blank_lines_are_skipped() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");
    let line = serde_json::to_string(&record("a", vec![1.0])).expect("serializes");
    std::fs::write(&path, format!("\n{}\n\n", line)).expect("should write");

    assert_eq!(read_records(&path).expect("should read").len(), 1);
}

#[test]
fn malformed_line_reports_file_and_line() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("bad.jsonl");
    let line = serde_json::to_string(&record("a", vec![1.0])).expect("serializes");
    std::fs::write(&path, format!("{}\n{{\"id\": 3}}\n", line)).expect("should write");

    match read_records(&path) {
        Err(RagError::MalformedRecord { path: bad, line, .. }) => {
            assert_eq!(bad, path);
            assert_eq!(line, 2);
        }
        other => panic!("expected malformed record error, got {:?}", other),
    }
}

#[test]
fn limited_read_stops_early() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("out.jsonl");
    let records: Vec<_> = (0..5)
        .map(|i| record(&format!("r{}", i), vec![i as f32]))
        .collect();
    write_records(&path, &records).expect("should write");

    // A malformed tail is never reached
    let mut content = std::fs::read_to_string(&path).expect("should read");
    content.push_str("not json\n");
    std::fs::write(&path, content).expect("should rewrite");

    let first = read_records_limited(&path, 3).expect("should read first records");
    assert_eq!(first, records[..3].to_vec());
}

#[test]
fn lists_only_jsonl_files_sorted() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    for name in [
        "cnn_articles_world.jsonl",
        "cnn_articles_business.jsonl",
        "notes.txt",
        "cnn_articles_politics.jsonl",
    ] {
        std::fs::write(temp_dir.path().join(name), "").expect("should write");
    }
    std::fs::create_dir(temp_dir.path().join("dir.jsonl")).expect("should create dir");

    let names: Vec<_> = list_jsonl_files(temp_dir.path())
        .expect("should list")
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    assert_eq!(
        names,
        vec![
            "cnn_articles_business.jsonl",
            "cnn_articles_politics.jsonl",
            "cnn_articles_world.jsonl"
        ]
    );
}

#[test]
fn missing_directory_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert!(matches!(
        list_jsonl_files(&temp_dir.path().join("absent")),
        Err(RagError::Io(_))
    ));
}
