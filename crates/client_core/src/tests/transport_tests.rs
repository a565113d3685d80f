use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header::ACCEPT, HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{QueryParams, RowKey, TriState};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::broadcast,
};
use url::Url;

use super::*;
use crate::{
    screens,
    transport::{ActionRequest, CollectionRequest, HttpMethod},
};

#[derive(Clone, Default)]
struct ApiState {
    accept_headers: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn handle_ip_logs(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    if let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        state
            .accept_headers
            .lock()
            .expect("lock")
            .push(accept.to_string());
    }
    state.queries.lock().expect("lock").push(query.clone());
    let logs = vec![
        json!({"id": 1, "user_id": 7, "ip_address": "10.0.0.1", "is_suspicious": true}),
        json!({"id": 2, "user_id": 8, "ip_address": "10.0.0.2", "is_suspicious": false}),
    ];
    let wanted = query.get("suspicious").map(|v| v == "true");
    Json(Value::Array(
        logs.into_iter()
            .filter(|log| wanted.is_none() || log["is_suspicious"].as_bool() == wanted)
            .collect(),
    ))
}

async fn handle_mark_safe(Path(log_id): Path<i64>) -> (StatusCode, Json<Value>) {
    if log_id == 404 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "IP log not found", "updated_id": log_id})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"message": "IP log updated successfully", "updated_id": log_id})),
    )
}

async fn handle_user_profiles() -> Json<Value> {
    Json(json!([
        {"user_id": 5, "is_verified": false, "trust_score": 37, "created_at": "2025-01-01T00:00:00"},
        {"user_id": 6, "is_verified": true, "trust_score": 50, "created_at": "2025-01-02T00:00:00"},
    ]))
}

async fn handle_verify(Query(query): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    match query.get("user_id").and_then(|v| v.parse::<i64>().ok()) {
        Some(user_id) => (
            StatusCode::OK,
            Json(json!({"user_id": user_id, "verified": true, "new_trust": 42})),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "user_id is required"})),
        ),
    }
}

async fn handle_broken() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "database unavailable", "message": "ignored"})),
    )
}

async fn handle_not_a_list() -> Json<Value> {
    Json(json!({"rows": []}))
}

async fn spawn_api_server() -> Result<(Url, ApiState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ApiState::default();
    let app = Router::new()
        .route("/ip/ip_logs", get(handle_ip_logs))
        .route("/ip/mark_safe/:log_id", put(handle_mark_safe))
        .route("/user/user_profiles", get(handle_user_profiles))
        .route("/user/verify", get(handle_verify))
        .route("/broken", get(handle_broken))
        .route("/not_a_list", get(handle_not_a_list))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}"))?, state))
}

fn collection(path: &str, query: &[(&str, &str)]) -> CollectionRequest {
    CollectionRequest {
        path: path.to_string(),
        query: query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[test]
fn endpoint_url_keeps_base_path_prefix() {
    let transport = HttpTransport::new(Url::parse("http://api.internal:8080/v1/").expect("url"));
    let url = transport
        .endpoint_url(
            "/ip/ip_logs",
            None,
            &[("suspicious".to_string(), "true".to_string())],
        )
        .expect("endpoint");
    assert_eq!(url.as_str(), "http://api.internal:8080/v1/ip/ip_logs?suspicious=true");
}

#[test]
fn row_key_stays_one_path_segment() {
    let transport = HttpTransport::new(Url::parse("http://api.internal:8080/v1").expect("url"));
    let action = screens::ip_logs();
    let action = action.find_action(screens::MARK_SAFE).expect("mark-safe action");

    for (key, encoded) in [
        ("x#1", "/v1/ip/mark_safe/x%231"),
        ("q?z=1", "/v1/ip/mark_safe/q%3Fz=1"),
        ("a/b", "/v1/ip/mark_safe/a%2Fb"),
        ("42", "/v1/ip/mark_safe/42"),
    ] {
        let request = action.request(&RowKey::from(key), &json!({}));
        let url = transport
            .endpoint_url(&request.path, request.segment.as_deref(), &request.query)
            .expect("endpoint");
        assert_eq!(url.path(), encoded, "key {key}");
        assert_eq!(url.query(), None, "key {key}");
        assert_eq!(url.fragment(), None, "key {key}");
        assert_eq!(
            url.path_segments().and_then(|mut s| s.next_back()),
            encoded.rsplit('/').next(),
        );
    }
}

#[tokio::test]
async fn fetch_collection_sends_filter_and_accept_header() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let transport = HttpTransport::new(base_url);

    let rows = transport
        .fetch_collection(&collection("/ip/ip_logs", &[("suspicious", "true")]))
        .await
        .expect("fetch");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key("id"), Some(RowKey::from(1)));
    assert_eq!(
        state.accept_headers.lock().expect("lock").as_slice(),
        ["application/json".to_string()]
    );
    let queries = state.queries.lock().expect("lock");
    assert_eq!(queries[0].get("suspicious").map(String::as_str), Some("true"));
}

#[tokio::test]
async fn non_success_status_carries_server_error_text() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let transport = HttpTransport::new(base_url);

    let err = transport
        .fetch_collection(&collection("/broken", &[]))
        .await
        .expect_err("must fail");

    assert_eq!(
        err,
        FetchError::Http {
            status: 500,
            message: Some("database unavailable".to_string()),
        }
    );
    assert_eq!(
        err.describe("Request failed"),
        "Request failed (500): database unavailable"
    );
}

#[tokio::test]
async fn missing_route_falls_back_to_status_reason() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let transport = HttpTransport::new(base_url);

    let err = transport
        .fetch_collection(&collection("/nowhere", &[]))
        .await
        .expect_err("must fail");

    assert_eq!(err.status(), Some(404));
    assert_eq!(err.describe("Request failed"), "Request failed (404): Not Found");
}

#[tokio::test]
async fn truncated_error_body_keeps_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = [0u8; 2048];
        let _ = socket.read(&mut request).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 503 Service Unavailable\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"err",
            )
            .await;
        let _ = socket.shutdown().await;
    });
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let transport = HttpTransport::new(Url::parse(&format!("http://{addr}")).expect("url"));

    let err = transport
        .fetch_collection(&collection("/ip/ip_logs", &[]))
        .await
        .expect_err("must fail");

    assert_eq!(
        err,
        FetchError::Http {
            status: 503,
            message: None,
        }
    );
    assert_eq!(
        err.describe("Request failed"),
        "Request failed (503): Service Unavailable"
    );
}

#[tokio::test]
async fn non_array_body_is_invalid_payload() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let transport = HttpTransport::new(base_url);

    let err = transport
        .fetch_collection(&collection("/not_a_list", &[]))
        .await
        .expect_err("must fail");

    assert!(matches!(err, FetchError::InvalidPayload(_)), "unexpected: {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let transport =
        HttpTransport::new(Url::parse(&format!("http://{addr}")).expect("url"));

    let err = transport
        .fetch_collection(&collection("/ip/ip_logs", &[]))
        .await
        .expect_err("must fail");

    assert!(matches!(err, FetchError::Network(_)), "unexpected: {err:?}");
    assert_eq!(err.status(), None);
    assert!(err.describe("Request failed").starts_with("Request failed: "));
}

#[tokio::test]
async fn put_action_targets_row_path() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let transport = HttpTransport::new(base_url);

    let response = transport
        .invoke(&ActionRequest {
            method: HttpMethod::Put,
            path: "/ip/mark_safe".to_string(),
            segment: Some("12".to_string()),
            query: Vec::new(),
            body: None,
        })
        .await
        .expect("mark safe");
    assert_eq!(response["updated_id"], json!(12));

    let err = transport
        .invoke(&ActionRequest {
            method: HttpMethod::Put,
            path: "/ip/mark_safe".to_string(),
            segment: Some("404".to_string()),
            query: Vec::new(),
            body: None,
        })
        .await
        .expect_err("must fail");
    assert_eq!(err.describe("Mark safe failed for 404"), "Mark safe failed for 404 (404): IP log not found");
}

async fn wait_for(
    events: &mut broadcast::Receiver<ViewEvent>,
    wanted: impl Fn(&ViewEvent) -> bool,
) -> ViewEvent {
    loop {
        let event = events.recv().await.expect("event");
        if wanted(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn controller_loads_and_verifies_over_http() {
    let (base_url, _state) = spawn_api_server().await.expect("spawn server");
    let controller =
        ListViewController::new(screens::user_profiles(), Arc::new(HttpTransport::new(base_url)));
    let mut events = controller.subscribe();

    controller.load(QueryParams::default()).expect("load");
    wait_for(&mut events, |e| {
        matches!(e, ViewEvent::LifecycleChanged(Lifecycle::Succeeded))
    })
    .await;
    assert_eq!(controller.rows().len(), 2);

    controller
        .perform_action(RowKey::from(5), screens::VERIFY, json!({}))
        .expect("verify");
    assert!(controller.is_pending(&RowKey::from(5)));
    let finished = wait_for(&mut events, |e| matches!(e, ViewEvent::ActionFinished { .. })).await;
    assert_eq!(
        finished,
        ViewEvent::ActionFinished {
            row_key: RowKey::from(5),
            action: screens::VERIFY.to_string(),
            succeeded: true,
        }
    );

    let row = controller.row(&RowKey::from(5)).expect("row 5");
    assert_eq!(row.get_bool("is_verified"), Some(true));
    assert_eq!(row.get("trust_score"), Some(&json!(42)));
    assert!(!controller.is_pending(&RowKey::from(5)));
    let success = controller
        .banner(shared::domain::BannerKind::Success)
        .expect("success banner");
    assert_eq!(success.message, "User 5 verified (trust → 42).");
    controller.shutdown();
}

#[tokio::test]
async fn server_filter_change_refetches_with_query_argument() {
    let (base_url, state) = spawn_api_server().await.expect("spawn server");
    let controller =
        ListViewController::new(screens::ip_logs(), Arc::new(HttpTransport::new(base_url)));
    let mut events = controller.subscribe();

    controller.load(QueryParams::default()).expect("load");
    wait_for(&mut events, |e| matches!(e, ViewEvent::RowsReplaced { .. })).await;
    assert_eq!(controller.visible_rows().len(), 2);

    controller
        .set_query_params(QueryParams::default().with_filter("suspicious", TriState::Only(false)))
        .expect("set params");
    assert_eq!(controller.lifecycle(), Lifecycle::Loading);
    wait_for(&mut events, |e| matches!(e, ViewEvent::RowsReplaced { .. })).await;

    let visible = controller.visible_rows();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].key("id"), Some(RowKey::from(2)));
    let queries = state.queries.lock().expect("lock");
    assert_eq!(queries.len(), 2);
    assert!(queries[0].is_empty());
    assert_eq!(queries[1].get("suspicious").map(String::as_str), Some("false"));
}
