#![cfg(feature = "server")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use iptvregistry::api::create_router;
use iptvregistry::{MemoryStore, Registry, RegistryServerExt};
use iptvserver::Server;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router() -> (Arc<Registry>, Router) {
    let registry = Arc::new(Registry::new(Arc::new(MemoryStore::new())));
    (registry.clone(), create_router(registry))
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_upsert_get_list_delete() {
    let (_, router) = router();

    let (status, body) = send(
        &router,
        Method::POST,
        "/",
        Some(r#"{"macAddress":"aa-bb-cc-dd-ee-ff","m3uUrl":"http://example.com/list.m3u"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Device created");
    assert_eq!(body["created"], true);
    assert_eq!(body["device"]["macAddress"], "AA:BB:CC:DD:EE:FF");
    assert_eq!(body["device"]["m3uUrl"], "http://example.com/list.m3u");
    assert_eq!(body["device"]["createdAt"], body["device"]["updatedAt"]);

    let (status, body) = send(
        &router,
        Method::POST,
        "/",
        Some(r#"{"macAddress":"AA:BB:CC:DD:EE:FF","m3uUrl":"http://example.com/list2.m3u"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Device updated");
    assert_eq!(body["created"], false);

    let (status, body) = send(&router, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["m3uUrl"], "http://example.com/list2.m3u");

    let (status, body) = send(&router, Method::GET, "/aa-bb-cc-dd-ee-ff", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["macAddress"], "AA:BB:CC:DD:EE:FF");

    let (status, body) = send(&router, Method::DELETE, "/aa:bb:cc:dd:ee:ff", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Device AA:BB:CC:DD:EE:FF deleted");

    let (status, body) = send(&router, Method::GET, "/AA:BB:CC:DD:EE:FF", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, _) = send(&router, Method::DELETE, "/AA:BB:CC:DD:EE:FF", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_errors() {
    let (registry, router) = router();

    let cases = [
        (
            r#"{"macAddress":"AABBCCDDEEFF","m3uUrl":"http://example.com/list.m3u"}"#,
            "INVALID_IDENTIFIER",
        ),
        (
            r#"{"macAddress":"AA:BB:CC:DD:EE:FF","m3uUrl":"not-a-url"}"#,
            "INVALID_URL",
        ),
        (r#"{"macAddress":"AA:BB:CC:DD:EE:FF"}"#, "INVALID_REQUEST"),
        (
            r#"{"macAddress":"AA:BB:CC:DD:EE:FF","m3uUrl":"http://a/b","extra":1}"#,
            "INVALID_REQUEST",
        ),
        (r#"{"macAddress":42,"m3uUrl":"http://a/b"}"#, "INVALID_REQUEST"),
        ("not json", "INVALID_REQUEST"),
    ];

    for (payload, code) in cases {
        let (status, body) = send(&router, Method::POST, "/", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body["error"], code, "{payload}");
        assert!(body["message"].is_string(), "{payload}");
    }

    assert!(registry.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_aliases_are_accepted() {
    let (_, router) = router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/",
        Some(r#"{"identifier":"01:23:45:67:89:ab","playlistUrl":"https://example.com/x.m3u"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"]["macAddress"], "01:23:45:67:89:AB");
}

#[tokio::test]
async fn test_store_failure_is_generic() {
    let store = Arc::new(MemoryStore::new());
    let registry =
        Arc::new(Registry::new(store).with_timeout(Duration::from_millis(100)));
    registry.close().await.unwrap();
    let router = create_router(registry);

    let (status, body) = send(&router, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "STORE_UNAVAILABLE", "message": "Device store unavailable"})
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let (_, router) = router();
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/")
                .header(header::ORIGIN, "http://elsewhere.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_mounted_on_server() {
    let mut server = Server::new("Test", "localhost", 0);
    let registry = Arc::new(Registry::new(Arc::new(MemoryStore::new())));
    server.init_device_api(registry).await;
    let router = server.router().await;

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/devices",
        Some(r#"{"macAddress":"AA:BB:CC:DD:EE:FF","m3uUrl":"http://example.com/list.m3u"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, Method::GET, "/api/devices/aa-bb-cc-dd-ee-ff", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["m3uUrl"], "http://example.com/list.m3u");

    let (status, doc) = send(&router, Method::GET, "/api-docs/devices.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"].get("/{mac}").is_some());
}
