use super::*;

#[tokio::test]
async fn health_reports_version() {
    let (app, _manager, _dir) = test_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn openapi_json_is_served() {
    let (app, _manager, _dir) = test_app().await;

    let response = app.oneshot(get("/openapi.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(response).await;
    assert!(body["paths"]["/jobs/{id}/search"].is_object());
}

#[tokio::test]
async fn swagger_ui_follows_config() {
    let (app, _manager, _dir) = test_app().await;
    let response = app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.api.swagger_ui = false;
    let config = Arc::new(config);
    let manager = Arc::new(JobManager::new((*config).clone()).await.unwrap());
    let response = create_router(manager, config)
        .oneshot(get("/api-docs/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_stream_is_server_sent() {
    let (app, _manager, _dir) = test_app().await;

    let response = app.oneshot(get("/events")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");
}
