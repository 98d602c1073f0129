use super::sqlite::match_expression;
use super::*;
use serde_json::json;
use std::sync::Mutex;
use tempfile::TempDir;

fn write_export(dir: &Path) {
    let export = json!([
        {
            "id": "conv-porto",
            "title": "Trip planning",
            "create_time": 1700000000.0,
            "mapping": {
                "1": { "message": { "author": { "role": "user" }, "create_time": 1.0,
                        "content": { "parts": ["Which route should I drive to Porto?"] } } },
                "2": { "message": { "author": { "role": "assistant" }, "create_time": 2.0,
                        "content": { "parts": ["The coastal route is the scenic one."] } } }
            }
        },
        {
            "id": "conv-bread",
            "title": "Sourdough",
            "mapping": {
                "1": { "message": { "author": { "role": "user" },
                        "content": { "parts": ["How long should the starter rest?"] } } }
            }
        }
    ]);
    std::fs::write(dir.join("conversations.json"), export.to_string()).unwrap();
}

#[tokio::test]
async fn ingest_then_search_finds_matching_conversation() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("extracted");
    std::fs::create_dir_all(&source).unwrap();
    write_export(&source);
    let index_path = dir.path().join("indexes").join("job.sqlite3");

    let calls = Mutex::new(Vec::new());
    let count = SqliteIndex::default()
        .ingest(&source, &index_path, &|done, total| {
            calls.lock().unwrap().push((done, total))
        })
        .await
        .unwrap();

    assert_eq!(count, 2);
    assert_eq!(calls.into_inner().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
    assert!(index_path.exists());
    assert!(!dir.path().join("indexes").join("job.sqlite3.tmp").exists());

    let hits = SqliteIndex::default()
        .search(&index_path, "coastal", 10)
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "conv-porto");
    assert_eq!(hits[0].title, "Trip planning");
    assert_eq!(hits[0].timestamp, "2023-11-14T22:13:20+00:00");
    assert!(hits[0].snippet.contains("[coastal]"), "{}", hits[0].snippet);
}

#[tokio::test]
async fn reingest_replaces_previous_index() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("src");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("a.txt"), "zebra crossing").unwrap();
    let index_path = dir.path().join("job.sqlite3");
    let index = SqliteIndex::default();

    index.ingest(&source, &index_path, &|_, _| {}).await.unwrap();
    std::fs::write(source.join("a.txt"), "giraffe crossing").unwrap();
    // leftover staging file from a crashed build
    std::fs::write(dir.path().join("job.sqlite3.tmp"), b"garbage").unwrap();
    index.ingest(&source, &index_path, &|_, _| {}).await.unwrap();

    assert!(index.search(&index_path, "zebra", 10).await.unwrap().is_empty());
    let hits = index.search(&index_path, "giraffe", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a.txt");
}

#[tokio::test]
async fn index_under_directory_with_url_characters() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data?mode=ro#x");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("notes.txt"), "harbour lighthouse").unwrap();
    let index_path = dir.path().join("idx?cache=shared#frag").join("job.sqlite3");
    let index = SqliteIndex::default();

    let count = index.ingest(&data, &index_path, &|_, _| {}).await.unwrap();

    assert_eq!(count, 1);
    assert!(index_path.exists());
    assert!(!dir.path().join("idx").exists());
    let hits = index.search(&index_path, "lighthouse", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "notes.txt");
}

#[tokio::test]
async fn empty_source_is_no_documents() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), [0xff, 0xd8]).unwrap();

    let err = SqliteIndex::default()
        .ingest(dir.path(), &dir.path().join("out.sqlite3"), &|_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::NoDocuments { .. }));
    assert!(!dir.path().join("out.sqlite3").exists());
}

#[tokio::test]
async fn fts_syntax_in_queries_is_treated_as_text() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "starter AND flour (ratio)").unwrap();
    let index_path = dir.path().join("i.sqlite3");
    let index = SqliteIndex::default();
    index.ingest(dir.path(), &index_path, &|_, _| {}).await.unwrap();

    for query in ["flour)", "\"starter", "AND", "NEAR("] {
        assert!(
            index.search(&index_path, query, 10).await.is_ok(),
            "query {query:?} should not error"
        );
    }
    assert_eq!(index.search(&index_path, "flour AND", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_query_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let hits = SqliteIndex::default()
        .search(&dir.path().join("missing.sqlite3"), "   ", 10)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn search_respects_limit() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        std::fs::write(dir.path().join(format!("{i}.txt")), "shared keyword").unwrap();
    }
    let index_path = dir.path().join("i.sqlite3");
    let index = SqliteIndex::default();
    index.ingest(dir.path(), &index_path, &|_, _| {}).await.unwrap();

    assert_eq!(index.search(&index_path, "keyword", 3).await.unwrap().len(), 3);
}

#[test]
fn match_expression_quotes_terms() {
    assert_eq!(match_expression("  "), None);
    assert_eq!(match_expression("a b").as_deref(), Some("\"a\" \"b\""));
    assert_eq!(match_expression("say \"hi\"").as_deref(), Some("\"say\" \"\"\"hi\"\"\""));
}
