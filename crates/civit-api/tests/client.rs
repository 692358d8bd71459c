//! Client behaviour against an in-process stand-in for the CivitAI API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use civit_api::{AdaptiveThresholds, Api, ApiError, CivitClient, MemoryProbe, MemoryUsage};
use civit_types::{ModelType, SearchParams};
use futures::StreamExt;
use serde_json::{Value, json};

#[derive(Default)]
struct Mock {
    model_hits: AtomicUsize,
    search_hits: AtomicUsize,
    flaky_hits: AtomicUsize,
    limited_hits: AtomicUsize,
    last_auth: Mutex<Option<String>>,
    last_limit: Mutex<Option<String>>,
}

fn model_json(id: u64) -> Value {
    json!({
        "id": id,
        "name": format!("model {id}"),
        "type": "LORA",
        "tags": ["anime"],
        "mode": "Archived",
        "modelVersions": [{"id": id * 10, "name": "v1", "baseModel": "SDXL 1.0"}]
    })
}

async fn get_model(
    State(mock): State<Arc<Mock>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Response {
    mock.model_hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    match id {
        404 => (StatusCode::NOT_FOUND, Json(json!({"error": "No model with id 404"}))).into_response(),
        99 => {
            if mock.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                (StatusCode::BAD_GATEWAY, "upstream hiccup").into_response()
            } else {
                Json(model_json(99)).into_response()
            }
        }
        429 => {
            if mock.limited_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")], "slow down").into_response()
            } else {
                Json(model_json(429)).into_response()
            }
        }
        400 => (StatusCode::BAD_REQUEST, "bad").into_response(),
        id => Json(model_json(id)).into_response(),
    }
}

// Two cursor pages; the second repeats model 3.
async fn search(State(mock): State<Arc<Mock>>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    mock.search_hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_limit.lock().unwrap() = q.get("limit").cloned();
    match q.get("cursor").map(String::as_str) {
        None => Json(json!({
            "items": [model_json(1), model_json(2), model_json(3)],
            "metadata": {"nextCursor": "c2", "pageSize": 3}
        })),
        Some("c2") => Json(json!({
            "items": [model_json(3), model_json(4)],
            "metadata": {"nextCursor": 77}
        })),
        Some(_) => Json(json!({"items": [], "metadata": {}})),
    }
}

async fn by_hash(Path(hash): Path<String>) -> Json<Value> {
    Json(json!({"id": 5, "modelId": 1, "name": hash}))
}

async fn tags(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "items": [{"name": q.get("query").cloned().unwrap_or_default(), "modelCount": 3}],
        "metadata": {"currentPage": 1, "totalPages": 1}
    }))
}

async fn spawn_mock() -> (Arc<Mock>, String) {
    let mock = Arc::new(Mock::default());
    let app = Router::new()
        .route("/api/v1/models", get(search))
        .route("/api/v1/models/{id}", get(get_model))
        .route("/api/v1/model-versions/by-hash/{hash}", get(by_hash))
        .route("/api/v1/tags", get(tags))
        .with_state(Arc::clone(&mock));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{addr}/api/v1"))
}

fn client(base: &str) -> CivitClient {
    Api::new()
        .no_proxy()
        .set_base_url(base)
        .set_requests_per_second(0.0)
        .set_retry_count(2)
        .set_retry_delay(Duration::from_millis(1))
        .build()
        .unwrap()
}

#[tokio::test]
async fn get_model_is_cached() {
    let (mock, base) = spawn_mock().await;
    let c = client(&base);

    let m = c.get_model(7).await.unwrap();
    assert_eq!(m.id, 7);
    assert_eq!(m.model_type, ModelType::Lora);
    let again = c.get_model(7).await.unwrap();
    assert_eq!(again, m);

    assert_eq!(mock.model_hits.load(Ordering::SeqCst), 1);
    let stats = c.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn cache_can_be_disabled() {
    let (mock, base) = spawn_mock().await;
    let c = Api::new()
        .no_proxy()
        .set_base_url(&base)
        .set_requests_per_second(0.0)
        .set_cache_ttl(Duration::ZERO)
        .build()
        .unwrap();
    c.get_model(7).await.unwrap();
    c.get_model(7).await.unwrap();
    assert_eq!(mock.model_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let (mock, base) = spawn_mock().await;
    let err = client(&base).get_model(404).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert_eq!(mock.model_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn client_errors_surface_status() {
    let (_mock, base) = spawn_mock().await;
    let err = client(&base).get_model(400).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 400, .. }), "{err}");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (mock, base) = spawn_mock().await;
    let m = client(&base).get_model(99).await.unwrap();
    assert_eq!(m.id, 99);
    assert_eq!(mock.flaky_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_response_is_retried() {
    let (mock, base) = spawn_mock().await;
    let m = client(&base).get_model(429).await.unwrap();
    assert_eq!(m.id, 429);
    assert_eq!(mock.limited_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bearer_token_is_sent() {
    let (mock, base) = spawn_mock().await;
    let c = Api::new()
        .no_proxy()
        .set_base_url(&base)
        .set_api_key("s3cret")
        .build()
        .unwrap();
    c.get_model(1).await.unwrap();
    assert_eq!(mock.last_auth.lock().unwrap().as_deref(), Some("Bearer s3cret"));
}

#[tokio::test]
async fn raw_blob_is_preserved() {
    let (_mock, base) = spawn_mock().await;
    let (model, raw) = client(&base).get_model_raw(12).await.unwrap();
    assert_eq!(model.id, 12);
    assert_eq!(raw["modelVersions"][0]["baseModel"], "SDXL 1.0");
}

#[tokio::test]
async fn stream_follows_cursors_and_dedups() {
    let (mock, base) = spawn_mock().await;
    let c = client(&base);
    let models = c
        .stream_models(SearchParams::new().model_type(ModelType::Lora).limit(3))
        .collect_all()
        .await
        .unwrap();
    let ids: Vec<u64> = models.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    // Third request (cursor 77) returns an empty page and ends the stream.
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stream_stops_at_max_items() {
    let (mock, base) = spawn_mock().await;
    let mut stream = client(&base)
        .stream_models(SearchParams::new())
        .max_items(2)
        .into_stream();
    let mut ids = Vec::new();
    while let Some(m) = stream.next().await {
        ids.push(m.unwrap().id);
    }
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn raw_stream_keeps_undeclared_fields() {
    let (_mock, base) = spawn_mock().await;
    let items: Vec<(civit_types::Model, Value)> = client(&base)
        .stream_models(SearchParams::new())
        .max_items(1)
        .into_raw_stream()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    let (model, raw) = &items[0];
    assert_eq!(model.id, 1);
    assert_eq!(raw["mode"], "Archived");
    assert!(raw.get("allowNoCredit").is_none());
}

/// How a misbehaving `/models` endpoint answers every request.
#[derive(Clone, Copy)]
enum Stuck {
    /// Same item, same cursor.
    Repeat,
    /// A new item each time but the cursor never moves.
    SameCursor,
    /// A new item each time, always claiming to be page 1 of 5.
    SamePage,
}

async fn stuck_search(State((mode, hits)): State<(Stuck, Arc<AtomicUsize>)>) -> Json<Value> {
    let n = hits.fetch_add(1, Ordering::SeqCst) as u64 + 1;
    Json(match mode {
        Stuck::Repeat => json!({"items": [model_json(1)], "metadata": {"nextCursor": "same"}}),
        Stuck::SameCursor => json!({"items": [model_json(n)], "metadata": {"nextCursor": "same"}}),
        Stuck::SamePage => json!({
            "items": [model_json(n)],
            "metadata": {"currentPage": 1, "totalPages": 5}
        }),
    })
}

async fn spawn_stuck(mode: Stuck) -> (Arc<AtomicUsize>, CivitClient) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/v1/models", get(stuck_search))
        .with_state((mode, Arc::clone(&hits)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = Api::new()
        .no_proxy()
        .set_base_url(format!("http://{addr}/api/v1"))
        .set_requests_per_second(0.0)
        .set_cache_ttl(Duration::ZERO)
        .build()
        .unwrap();
    (hits, client)
}

async fn collect_ids(client: &CivitClient) -> Vec<u64> {
    let models = tokio::time::timeout(
        Duration::from_secs(5),
        client.stream_models(SearchParams::new()).collect_all(),
    )
    .await
    .expect("stream did not terminate")
    .unwrap();
    models.iter().map(|m| m.id).collect()
}

#[tokio::test]
async fn stream_ends_when_pages_repeat() {
    let (hits, c) = spawn_stuck(Stuck::Repeat).await;
    assert_eq!(collect_ids(&c).await, vec![1]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_ends_when_cursor_does_not_advance() {
    let (hits, c) = spawn_stuck(Stuck::SameCursor).await;
    assert_eq!(collect_ids(&c).await, vec![1, 2]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stream_ends_when_page_number_does_not_advance() {
    let (hits, c) = spawn_stuck(Stuck::SamePage).await;
    assert_eq!(collect_ids(&c).await, vec![1, 2]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

struct Pressured;

impl MemoryProbe for Pressured {
    fn usage(&self) -> MemoryUsage {
        MemoryUsage { total_bytes: 100, available_bytes: 10 }
    }
}

#[tokio::test]
async fn adaptive_stream_shrinks_page_size() {
    let (mock, base) = spawn_mock().await;
    let c = client(&base);
    c.stream_models(SearchParams::new().limit(100))
        .max_pages(1)
        .adaptive(AdaptiveThresholds::new(100, 64, 4), Arc::new(Pressured))
        .collect_all()
        .await
        .unwrap();
    assert_eq!(mock.last_limit.lock().unwrap().as_deref(), Some("50"));
    assert_eq!(c.cache_stats().capacity, 32);
}

#[tokio::test]
async fn version_by_hash_validates_input() {
    let (_mock, base) = spawn_mock().await;
    let c = client(&base);
    let v = c.get_model_version_by_hash("ABCDEF0123").await.unwrap();
    assert_eq!(v.id, 5);
    assert!(matches!(
        c.get_model_version_by_hash("../etc").await.unwrap_err(),
        ApiError::InvalidArgument(_)
    ));
}

#[tokio::test]
async fn tag_listing() {
    let (_mock, base) = spawn_mock().await;
    let page = client(&base).list_tags(Some("anime"), 20, 1).await.unwrap();
    assert_eq!(page.items[0].name, "anime");
    assert_eq!(page.items[0].model_count, Some(3));
}
