use super::*;
use crate::config::RetryConfig;
use crate::job::JobInfo;
use crate::types::{JobId, Stage};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod jobs;
mod system;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

/// A started manager on a temp data dir, plus a router over it
async fn test_app() -> (Router, Arc<JobManager>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(test_config(dir.path()));
    let manager = Arc::new(JobManager::new((*config).clone()).await.unwrap());
    manager.startup().await.unwrap();
    (create_router(manager.clone(), config), manager, dir)
}

fn export_archive() -> Vec<u8> {
    let conversations = serde_json::json!([{
        "id": "conv-1",
        "title": "Sourdough",
        "create_time": 1700000000.0,
        "mapping": {
            "a": { "message": { "author": { "role": "user" }, "create_time": 1.0,
                    "content": { "parts": ["How long should the starter rest?"] } } }
        }
    }])
    .to_string();

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("conversations.json", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(conversations.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for_stage(manager: &JobManager, id: &JobId, stage: Stage) -> JobInfo {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(info) = manager.get_job(id).await
                && info.stage == stage
            {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never reached {stage}"))
}

#[tokio::test]
async fn api_server_spawns() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);
    let manager = Arc::new(JobManager::new((*config).clone()).await.unwrap());

    let handle = tokio::spawn(start_api_server(manager, config));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!handle.is_finished(), "server should still be running");
    handle.abort();
}

#[tokio::test]
async fn cors_headers_are_added_when_enabled() {
    let (app, _manager, _dir) = test_app().await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.api.cors_enabled = false;
    let config = Arc::new(config);
    let manager = Arc::new(JobManager::new((*config).clone()).await.unwrap());
    let app = create_router(manager, config);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(!response.headers().contains_key("access-control-allow-origin"));
}
