#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests over a SQLite content database, a mocked embeddings
// endpoint, the on-disk LanceDB store and the SQLite embedding cache

use content_retrieval::RetrievalError;
use content_retrieval::config::Config;
use content_retrieval::retrieval::{Retriever, SearchOutcome};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const DIMENSION: usize = 8;

/// Letter histogram over a..h; similar spellings land close together
fn letter_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for c in text.chars() {
        let offset = (c as u32).wrapping_sub('a' as u32) as usize;
        if offset < DIMENSION {
            vector[offset] += 1.0;
        }
    }
    vector
}

fn embeddings_response(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).expect("request body is json");
    let input = body["input"].as_str().expect("input is a string");

    ResponseTemplate::new(200).set_body_json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": letter_embedding(input)}],
        "model": body["model"],
    }))
}

async fn seed_content(temp_dir: &TempDir, records: &[(i64, &str)]) -> String {
    let db_path = temp_dir.path().join("content.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await
        .expect("should create content database");

    sqlx::query("CREATE TABLE articles (id INTEGER PRIMARY KEY, content TEXT NOT NULL)")
        .execute(&pool)
        .await
        .expect("should create table");

    for (id, content) in records {
        sqlx::query("INSERT INTO articles (id, content) VALUES (?, ?)")
            .bind(id)
            .bind(content)
            .execute(&pool)
            .await
            .expect("should insert row");
    }
    pool.close().await;

    format!("sqlite://{}?mode=ro", db_path.display())
}

fn create_test_config(temp_dir: &TempDir, server: &MockServer, content_url: String) -> Config {
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedding.base_url = format!("{}/v1/", server.uri());
    config.embedding.model = "test-embedding".to_string();
    config.embedding.dimension = DIMENSION as u32;
    config.embedding.api_key = Some("test-key".to_string());
    config.embedding.retry_attempts = 1;
    config.content.database_url = Some(content_url);
    config.validate().expect("test config should be valid");
    config
}

async fn embedding_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread")]
async fn reindex_and_search_end_to_end() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(embeddings_response)
        .mount(&server)
        .await;

    let content_url = seed_content(&temp_dir, &[(1, "apple"), (2, "banana"), (3, "cabbage")]).await;
    let config = create_test_config(&temp_dir, &server, content_url);

    let retriever = Retriever::from_config(&config)
        .await
        .expect("should build retriever");

    let before = retriever
        .search_detailed("apple", 2)
        .await
        .expect("search before indexing");
    assert_eq!(before, SearchOutcome::NotIndexed);

    let report = retriever.reindex_all().await;
    assert!(report.error.is_none(), "unexpected error: {:?}", report.error);
    assert_eq!(report.processed, 3);
    assert_eq!(report.total, 3);

    // "apple" was already embedded by the query above
    assert_eq!(embedding_requests(&server).await, 3);

    let results = retriever.search("apple", 2).await.expect("should search");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, 1);
    assert_eq!(results[0].text, "apple");
    assert!(results[0].similarity.abs() < 1e-6);
    assert!(results[0].similarity <= results[1].similarity);

    let default_limited = retriever
        .search_default("aaab")
        .await
        .expect("should search");
    assert_eq!(default_limited.len(), 3);
    assert_eq!(default_limited[0].id, 2);

    retriever.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_cache_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(embeddings_response)
        .mount(&server)
        .await;

    let content_url = seed_content(&temp_dir, &[(10, "deadbeef"), (11, "facade")]).await;
    let config = create_test_config(&temp_dir, &server, content_url);

    let first = Retriever::from_config(&config)
        .await
        .expect("should build retriever");
    let report = first.reindex_all().await;
    assert!(report.is_complete());
    first.close().await;
    assert_eq!(embedding_requests(&server).await, 2);

    let second = Retriever::from_config(&config)
        .await
        .expect("should rebuild retriever");
    let report = second.reindex_all().await;
    assert!(report.is_complete());

    // Vectors came from the on-disk cache; rows are appended again
    assert_eq!(embedding_requests(&server).await, 2);
    assert_eq!(second.vectors().count().await.expect("should count"), 4);

    second.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_rejection_aborts_reindex() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let content_url = seed_content(&temp_dir, &[(1, "apple"), (2, "banana")]).await;
    let config = create_test_config(&temp_dir, &server, content_url);

    let retriever = Retriever::from_config(&config)
        .await
        .expect("should build retriever");
    let report = retriever.reindex_all().await;

    assert_eq!(report.processed, 0);
    assert_eq!(report.total, 2);
    assert!(matches!(
        report.error,
        Some(RetrievalError::EmbeddingProvider(_))
    ));
    assert_eq!(embedding_requests(&server).await, 1);

    let search = retriever.search("apple", 1).await;
    assert!(matches!(search, Err(RetrievalError::EmbeddingProvider(_))));

    retriever.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_content_database_fails_bootstrap() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    let missing = format!(
        "sqlite://{}?mode=ro",
        temp_dir.path().join("absent.db").display()
    );
    let config = create_test_config(&temp_dir, &server, missing);

    let result = Retriever::from_config(&config).await;
    assert!(matches!(result, Err(RetrievalError::Repository(_))));
}
