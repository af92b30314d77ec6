//! Defines the Axum API routes and handlers.

use crate::config::Config;
use crate::web::access_gate::{AccessGate, access_gate_middleware};
use crate::web::auth::{
    AuthBackend, Claims, InMemoryAuthBackend, RegisterError, TokenKeys, require_valid_token,
};
use crate::web::models::{
    AuthRequest, CreateTaskRequest, ListParams, LoginResponse, TokenCheckResponse,
};
use crate::web::notifier::ChangeNotifier;
use crate::web::revocation_filter::RevocationFilter;
use crate::web::task_store::{InMemoryTaskStore, TaskPatch, TaskStore};
use crate::web::tasks::{TaskBoard, TaskError, TaskQuery};
use crate::web::token_id::extract_session_id;
use crate::web::ws::ws_handler;
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use axum_extra::typed_header::TypedHeaderRejection;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Helper to create a JSON error response with a message and status code
pub fn json_error(message: &str, status: StatusCode) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn task_error(e: TaskError) -> axum::response::Response {
    match e {
        TaskError::TitleRequired => json_error("title required", StatusCode::BAD_REQUEST),
        TaskError::NotFound(_) => json_error("not found", StatusCode::NOT_FOUND),
        TaskError::Store(e) => {
            tracing::error!("task store failure: {}", e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Decodes a JSON request body. A missing or blank body is the default
/// value; anything else must parse, or the request is rejected with 400.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("rejecting request body: {}", e);
        json_error("invalid body", StatusCode::BAD_REQUEST)
    })
}

/// Process-wide state. One instance per server; every component is an
/// explicit value here rather than a global.
pub struct AppStateInner {
    pub auth_backend: Box<dyn AuthBackend>,
    pub tokens: TokenKeys,
    pub revocations: Arc<RevocationFilter>,
    pub gate: AccessGate,
    pub notifier: Arc<ChangeNotifier>,
    pub board: TaskBoard,
}
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(
        config: &Config,
        auth_backend: Box<dyn AuthBackend>,
        store: Arc<dyn TaskStore>,
    ) -> Self {
        let revocations = Arc::new(
            RevocationFilter::with_hashes(
                config.revocation.capacity_bits,
                config.revocation.hash_count,
            )
            .with_saturation_warning(config.revocation.saturation_warning),
        );
        let notifier = Arc::new(ChangeNotifier::new(config.notifier.buffer));
        Self {
            auth_backend,
            tokens: TokenKeys::new(config.auth.jwt_secret.as_bytes(), config.auth.jwt_expiration_secs),
            gate: AccessGate::new(revocations.clone()),
            revocations,
            board: TaskBoard::new(store, notifier.clone(), config.cache.ttl()),
            notifier,
        }
    }

    /// Releases live connections. Called once on shutdown.
    pub fn shutdown(&self) {
        self.notifier.close_all();
    }
}

/// Creates the Axum router with in-memory users and tasks.
pub fn create_router(config: &Config) -> Router {
    let state = Arc::new(AppStateInner::new(
        config,
        Box::new(InMemoryAuthBackend::new()),
        Arc::new(InMemoryTaskStore::new()),
    ));
    create_router_with_state(state)
}

pub fn create_router_with_state(state: AppState) -> Router {
    // Layers run bottom-up: revocation gate, then signature check.
    let protected = Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/auth/check", get(auth_check))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_valid_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), access_gate_middleware));

    Router::new()
        .route("/api/hello", get(hello))
        .route("/auth/register", post(auth_register))
        .route("/auth/login", post(auth_login))
        .route("/auth/logout", post(auth_logout))
        .route("/ws", get(ws_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::LOCATION])
}

pub fn app() -> Router {
    create_router(&Config::default())
}

async fn hello() -> axum::response::Response {
    Json(serde_json::json!({ "msg": "Hello from taskboard" })).into_response()
}

/// GET /api/tasks?q=
async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> axum::response::Response {
    match state.board.list(&TaskQuery { search: params.q }).await {
        Ok(rows) => (StatusCode::OK, Json(rows.as_slice())).into_response(),
        Err(e) => task_error(e),
    }
}

/// POST /api/tasks
async fn create_task(
    State(state): State<AppState>,
    body: Bytes,
) -> axum::response::Response {
    let request: CreateTaskRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.board.create(request.into()).await {
        Ok(task) => (
            StatusCode::CREATED,
            [(header::LOCATION, format!("/api/tasks/{}", task.id))],
            Json(task),
        )
            .into_response(),
        Err(e) => task_error(e),
    }
}

/// PUT /api/tasks/{id}
async fn update_task(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    body: Bytes,
) -> axum::response::Response {
    let Ok(Path(id)) = id else {
        return json_error("invalid id", StatusCode::BAD_REQUEST);
    };
    let patch: TaskPatch = match parse_body(&body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    match state.board.update(id, patch).await {
        Ok(task) => (StatusCode::OK, Json(task)).into_response(),
        Err(e) => task_error(e),
    }
}

/// DELETE /api/tasks/{id}
async fn delete_task(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> axum::response::Response {
    let Ok(Path(id)) = id else {
        return json_error("invalid id", StatusCode::BAD_REQUEST);
    };
    match state.board.delete(id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response(),
        Err(e) => task_error(e),
    }
}

/// POST /auth/register
async fn auth_register(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> axum::response::Response {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    match state.auth_backend.register(&request.email, &request.password).await {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "message": "User created" })),
        )
            .into_response(),
        Err(e @ RegisterError::MissingFields) => json_error(&e.to_string(), StatusCode::BAD_REQUEST),
        Err(e @ RegisterError::AlreadyExists) => json_error(&e.to_string(), StatusCode::CONFLICT),
    }
}

/// POST /auth/login
async fn auth_login(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> axum::response::Response {
    let request = body.map(|Json(req)| req).unwrap_or_default();
    if request.email.is_empty() || request.password.is_empty() {
        return json_error("Email and password are required", StatusCode::BAD_REQUEST);
    }
    let Some(user) = state.auth_backend.validate(&request.email, &request.password).await else {
        return json_error("Invalid email or password", StatusCode::UNAUTHORIZED);
    };
    match state.tokens.issue(&user) {
        Ok(token) => (
            StatusCode::OK,
            Json(LoginResponse { message: "Login successful".to_string(), token, user }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("login failed: {}", e);
            json_error("Internal error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /auth/check
async fn auth_check(Extension(claims): Extension<Claims>) -> axum::response::Response {
    tracing::debug!(user_id = claims.uid, "token check");
    (StatusCode::OK, Json(TokenCheckResponse { valid: true })).into_response()
}

/// POST /auth/logout -- revoke the session carried by the bearer token
async fn auth_logout(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> axum::response::Response {
    match auth.ok().and_then(|TypedHeader(auth)| extract_session_id(auth.token())) {
        Some(jti) => {
            state.revocations.insert(&jti);
            tracing::info!(jti = %jti, "session revoked on logout");
        }
        None => tracing::warn!("logout without a readable session id"),
    }
    (StatusCode::OK, Json(serde_json::json!({ "message": "Logged out" }))).into_response()
}
