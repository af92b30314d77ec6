//! End-to-end: login, cached reads, logout, and rejection of the revoked session

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use taskboard::config::Config;
use taskboard::web::api::{AppState, AppStateInner, create_router_with_state};
use taskboard::web::auth::InMemoryAuthBackend;
use taskboard::web::task_store::{
    InMemoryTaskStore, NewTask, StoreError, Task, TaskPatch, TaskStore,
};
use taskboard::web::token_id::extract_session_id;
use tower::util::ServiceExt;

/// Counts how often the list query reaches storage.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryTaskStore,
    list_calls: AtomicUsize,
}

#[async_trait]
impl TaskStore for CountingStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }
    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        self.inner.create(task).await
    }
    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task, StoreError> {
        self.inner.update(id, patch).await
    }
    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }
}

fn setup() -> (axum::Router, AppState, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::default());
    let state = Arc::new(AppStateInner::new(
        &Config::default(),
        Box::new(InMemoryAuthBackend::new()),
        store.clone(),
    ));
    (create_router_with_state(state.clone()), state, store)
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn with_token(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn login(app: &axum::Router, email: &str) -> String {
    let credentials = json!({ "email": email, "password": "hunter2" });
    app.clone().oneshot(post_json("/auth/register", credentials.clone())).await.unwrap();
    let response = app.clone().oneshot(post_json("/auth/login", credentials)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_logout_rejects_revoked_session_and_keeps_serving_others() {
    let (app, state, store) = setup();
    let alice = login(&app, "alice@example.com").await;
    let bob = login(&app, "bob@example.com").await;
    let alice_jti = extract_session_id(&alice).unwrap();

    // First read goes to storage and populates the cache.
    let response = app.clone().oneshot(with_token("GET", "/api/tasks", &alice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);

    let response = app.clone().oneshot(with_token("POST", "/auth/logout", &alice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.revocations.contains(&alice_jti));

    let response = app.clone().oneshot(with_token("GET", "/api/tasks", &alice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await, json!({ "error": "Session terminated" }));

    // A different session still works and is served from cache.
    let response = app.clone().oneshot(with_token("GET", "/api/tasks", &bob)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revoked_session_cannot_write() {
    let (app, state, _store) = setup();
    let token = login(&app, "carol@example.com").await;
    let mut subscription = state.notifier.subscribe();

    app.clone().oneshot(with_token("POST", "/auth/logout", &token)).await.unwrap();

    let create = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header("Authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "title": "sneaky" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(subscription.events.try_recv().is_err());

    let fresh = login(&app, "dave@example.com").await;
    let response = app.oneshot(with_token("GET", "/api/tasks", &fresh)).await.unwrap();
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_write_between_reads_forces_refetch() {
    let (app, _state, store) = setup();
    let token = login(&app, "erin@example.com").await;

    app.clone().oneshot(with_token("GET", "/api/tasks", &token)).await.unwrap();
    app.clone().oneshot(with_token("GET", "/api/tasks", &token)).await.unwrap();
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);

    let create = Request::builder()
        .method("POST")
        .uri("/api/tasks")
        .header("Authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "title": "new" }).to_string()))
        .unwrap();
    app.clone().oneshot(create).await.unwrap();

    let response = app.oneshot(with_token("GET", "/api/tasks", &token)).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 2);
}
