use super::*;
use crate::error::ApiError;
use crate::types::SearchHit;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn submitted_archive_becomes_searchable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(export_archive()))
        .mount(&server)
        .await;
    let (app, manager, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/jobs",
            serde_json::json!({ "url": format!("{}/export.zip", server.uri()) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: JobInfo = json_body(response).await;
    assert_eq!(created.stage, Stage::Queued);

    wait_for_stage(&manager, &created.id, Stage::Completed).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{}", created.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info: JobInfo = json_body(response).await;
    assert_eq!(info.documents_indexed, 1);

    let response = app
        .oneshot(get(&format!("/jobs/{}/search?q=starter", created.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let hits: Vec<SearchHit> = json_body(response).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "conv-1");
    assert!(hits[0].snippet.contains("[starter]"));
}

#[tokio::test]
async fn invalid_url_is_bad_request() {
    let (app, manager, _dir) = test_app().await;

    let response = app
        .oneshot(post_json("/jobs", serde_json::json!({ "url": "not a url" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "invalid_url");
    assert!(manager.list_jobs().await.is_empty());
}

#[tokio::test]
async fn list_returns_every_job() {
    let (app, manager, _dir) = test_app().await;
    // nothing listens on port 9, so both jobs end up failed
    let first = manager.create_job("http://127.0.0.1:9/a.zip").await.unwrap();
    let second = manager.create_job("http://127.0.0.1:9/b.zip").await.unwrap();

    let response = app.oneshot(get("/jobs")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let jobs: Vec<JobInfo> = json_body(response).await;
    let ids: Vec<JobId> = jobs.into_iter().map(|j| j.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.id));
    assert!(ids.contains(&second.id));
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let (app, _manager, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{}", JobId::generate())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "job_not_found");

    let response = app.oneshot(get("/jobs/not-a-job")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_job_can_be_retried_but_not_searched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let (app, manager, _dir) = test_app().await;
    let job = manager
        .create_job(&format!("{}/expired.zip", server.uri()))
        .await
        .unwrap();
    wait_for_stage(&manager, &job.id, Stage::Failed).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{}/search?q=anything", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "not_ready");

    let response = app
        .oneshot(post_json(
            &format!("/jobs/{}/retry", job.id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let retried: JobInfo = json_body(response).await;
    assert_eq!(retried.id, job.id);
}

#[tokio::test]
async fn retry_of_unknown_job_is_not_found() {
    let (app, _manager, _dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            &format!("/jobs/{}/retry", JobId::generate()),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_after_shutdown_is_unavailable() {
    let (app, manager, _dir) = test_app().await;
    manager.shutdown().await.unwrap();

    let response = app
        .oneshot(post_json(
            "/jobs",
            serde_json::json!({ "url": "https://backups.example.com/export.zip" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.error.code, "shutting_down");
}
