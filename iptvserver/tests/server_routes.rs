use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use axum::{Json, Router};
use iptvserver::logs::{LogState, LogsApiDoc, create_logs_router};
use iptvserver::{Server, ServerBuilder};
use serde_json::Value;
use tower::ServiceExt;
use utoipa::OpenApi;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_json_route() {
    let mut server = ServerBuilder::new("Test", "localhost", 0).build();
    server
        .add_route("/info", || async { serde_json::json!({"version": "1.0.0"}) })
        .await;

    let response = server.router().await.oneshot(get_request("/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["version"], "1.0.0");
}

#[tokio::test]
async fn test_root_redirect() {
    let mut server = Server::new("Test", "localhost", 0);
    server.add_redirect("/", "/app/").await;

    let response = server.router().await.oneshot(get_request("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/app/");
}

#[tokio::test]
async fn test_openapi_router_is_nested() {
    let mut server = Server::new("Test", "localhost", 0);
    let api = Router::new().route("/", get(|| async { Json(vec![1, 2, 3]) }));
    server.add_openapi(api, LogsApiDoc::openapi(), "things").await;

    let router = server.router().await;

    let response = router.clone().oneshot(get_request("/api/things")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([1, 2, 3]));

    let response = router
        .oneshot(get_request("/api-docs/things.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert!(doc["paths"].get("/log_setup").is_some());
}

#[tokio::test]
async fn test_log_setup_round_trip() {
    let state = LogState::new(10, None);
    let router = create_logs_router(state.clone());

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/log_setup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"level":"debug"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["current_level"], "DEBUG");
    assert_eq!(state.get_max_level(), tracing::Level::DEBUG);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/log_setup")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"level":"loud"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_binds_ephemeral_port() {
    let mut server = Server::new("Test", "localhost", 0);
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();
    assert_ne!(addr.port(), 0);
}
