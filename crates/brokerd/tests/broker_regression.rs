//! End-to-end router tests.
//!
//! Drives the full broker router the way a platform under test would:
//! scripted behaviors in, protocol replies out.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use broker_api::build_router;
use broker_state::ConfigStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const SYNC_PLAN: &str = "f52eabf8-e38d-422f-8ef9-9dc83b75cc05";
const ASYNC_PLAN: &str = "0a2de9a7-09c6-4a7c-84ee-c1d3a6b1a5a3";

fn test_router() -> Router {
    build_router(ConfigStore::open_default().unwrap())
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value).unwrap()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn catalog_with_and_without_trailing_slash() {
    let router = test_router();

    let (status, doc) = send(&router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["services"][0]["name"], "fake-service");

    let (status, _) = send(&router, "GET", "/v2/catalog/", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn async_provision_polls_to_completion() {
    let router = test_router();

    let (status, _) = send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": ASYNC_PLAN, "service_id": "svc"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1", None).await;
    assert_eq!(doc["state"], "in progress");
    let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1", None).await;
    assert_eq!(doc["state"], "succeeded");
    let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1/", None).await;
    assert_eq!(doc["state"], "succeeded");
}

#[tokio::test]
async fn raised_threshold_extends_polling() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({"max_fetch_service_instance_requests": 3})),
    )
    .await;
    send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": ASYNC_PLAN})),
    )
    .await;

    for _ in 0..3 {
        let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1", None).await;
        assert_eq!(doc["state"], "in progress");
    }
    let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1", None).await;
    assert_eq!(doc["state"], "succeeded");
}

#[tokio::test]
async fn update_restarts_polling() {
    let router = test_router();
    send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": ASYNC_PLAN})),
    )
    .await;
    send(&router, "GET", "/v2/service_instances/i-1", None).await;
    send(&router, "GET", "/v2/service_instances/i-1", None).await;

    let (status, _) = send(
        &router,
        "PATCH",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": SYNC_PLAN})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, doc) = send(&router, "GET", "/v2/service_instances/i-1", None).await;
    assert_eq!(doc["state"], "in progress");
}

#[tokio::test]
async fn fetch_of_unknown_instance_is_failed_operation() {
    let router = test_router();
    let (status, doc) = send(&router, "GET", "/v2/service_instances/nope", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["last_operation"]["state"], "failed");
    assert_eq!(
        doc["last_operation"]["description"],
        "Broker could not find service instance by the given id nope"
    );
}

#[tokio::test]
async fn update_of_unknown_instance_returns_envelope() {
    let router = test_router();
    let (status, doc) = send(
        &router,
        "PATCH",
        "/v2/service_instances/nope",
        Some(json!({"plan_id": SYNC_PLAN})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(doc["error"], true);
    assert_eq!(doc["type"], "500");
    assert_eq!(doc["path"], "/v2/service_instances/nope");
    assert!(doc["backtrace"].is_array());

    // The server keeps answering.
    let (status, _) = send(&router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deprovision_known_and_unknown() {
    let router = test_router();
    send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": SYNC_PLAN})),
    )
    .await;

    let (status, _) = send(&router, "DELETE", "/v2/service_instances/i-1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, "DELETE", "/v2/service_instances/ghost", None).await;
    assert_eq!(status, StatusCode::OK);

    // Deprovisioned instances stay in the registry.
    let (_, all) = send(&router, "GET", "/config/all", None).await;
    assert!(all["service_instances"]["i-1"].is_object());
    assert_eq!(all["service_instances"]["i-1"]["deleted"], true);
}

#[tokio::test]
async fn bind_plan_comes_from_binding_payload() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({
            "behaviors": {
                "bind": {
                    "bind-plan": {"status": 201, "body": {"credentials": {"user": "scripted"}}},
                    "default": {"status": 409, "body": {}}
                },
                "unbind": {"default": {"status": 200, "body": {}}}
            }
        })),
    )
    .await;

    let (status, doc) = send(
        &router,
        "PUT",
        "/v2/service_instances/i-1/service_bindings/b-1",
        Some(json!({"plan_id": "bind-plan"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["credentials"]["user"], "scripted");

    let (status, _) = send(
        &router,
        "PUT",
        "/v2/service_instances/i-1/service_bindings/b-2",
        Some(json!({"plan_id": "other"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &router,
        "DELETE",
        "/v2/service_instances/i-1/service_bindings/b-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = send(&router, "GET", "/config/all", None).await;
    assert!(all["service_instances"].get("b-1").is_none());
    assert!(all["service_instances"]["b-2"].is_object());
}

#[tokio::test]
async fn missing_behavior_is_reported() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({"behaviors": {"provision": {"only-plan": {"status": 201, "body": {}}}}})),
    )
    .await;

    let (status, doc) = send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": "something-else"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(doc["message"].as_str().unwrap().contains("something-else"));

    let (status, doc) = send(&router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(doc["message"].as_str().unwrap().contains("catalog"));
}

#[tokio::test]
async fn raw_body_is_sent_verbatim() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({
            "behaviors": {"catalog": {"status": 200, "raw_body": "{\"services\":[]}"}}
        })),
    )
    .await;

    let req = Request::builder()
        .uri("/v2/catalog")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], br#"{"services":[]}"#);
}

#[tokio::test]
async fn malformed_json_body_returns_envelope() {
    let router = test_router();
    let req = Request::builder()
        .method("PUT")
        .uri("/v2/service_instances/i-1")
        .header("content-type", "application/json")
        .body(Body::from("{\"plan_id\":"))
        .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let (_, all) = send(&router, "GET", "/config/all", None).await;
    assert!(all["service_instances"].get("i-1").is_none());
}

#[tokio::test]
async fn config_snapshots_and_reset() {
    let router = test_router();
    send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": SYNC_PLAN})),
    )
    .await;

    let (status, doc) = send(
        &router,
        "POST",
        "/config/",
        Some(json!({"max_fetch_service_instance_requests": 5, "note": "kept"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["max_fetch_service_instance_requests"], 5);
    assert_eq!(doc["note"], "kept");
    assert!(doc.get("service_instances").is_none());

    let (_, doc) = send(&router, "GET", "/config", None).await;
    assert!(doc.get("service_instances").is_none());
    assert!(doc["behaviors"]["catalog"].is_object());

    let (_, all) = send(&router, "GET", "/config/all/", None).await;
    assert!(all["service_instances"]["i-1"].is_object());

    let (status, doc) = send(&router, "POST", "/config/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["max_fetch_service_instance_requests"], 1);
    assert!(doc.get("note").is_none());

    let (_, all) = send(&router, "GET", "/config/all", None).await;
    assert_eq!(all["service_instances"], json!({}));
}

#[tokio::test]
async fn merged_instances_can_be_polled() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({
            "service_instances": {
                "seeded": {
                    "provision_data": {"plan_id": ASYNC_PLAN},
                    "fetch_count": 1,
                    "deleted": false
                }
            }
        })),
    )
    .await;

    let (_, doc) = send(&router, "GET", "/v2/service_instances/seeded", None).await;
    assert_eq!(doc["state"], "succeeded");
}

#[tokio::test]
async fn slow_reply_does_not_block_other_requests() {
    let router = test_router();
    send(
        &router,
        "POST",
        "/config",
        Some(json!({
            "behaviors": {
                "catalog": {"status": 200, "sleep_seconds": 0.3, "body": {}},
                "provision": {"default": {"status": 200, "body": {}}}
            }
        })),
    )
    .await;

    let slow_router = router.clone();
    let slow = tokio::spawn(async move { send(&slow_router, "GET", "/v2/catalog", None).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let (status, _) = send(
        &router,
        "PUT",
        "/v2/service_instances/i-1",
        Some(json!({"plan_id": SYNC_PLAN})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < std::time::Duration::from_millis(250));

    let (status, _) = slow.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unrepresentable_delay_is_rejected_and_server_recovers() {
    let router = test_router();
    let (status, doc) = send(
        &router,
        "POST",
        "/config",
        Some(json!({
            "behaviors": {"catalog": {"status": 200, "sleep_seconds": 1e20, "body": {}}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(doc["message"].as_str().unwrap().contains("sleep_seconds"));

    let (status, doc) = send(&router, "GET", "/v2/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["services"][0]["name"], "fake-service");

    let (status, _) = send(&router, "POST", "/config/reset", None).await;
    assert_eq!(status, StatusCode::OK);
}
