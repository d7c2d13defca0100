//! REST API server for the portfolio advisor
//!
//! Exposes chat, optimize, reset and payload over HTTP. Turns for the same
//! session are serialized with a per-session lock.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::coordinator::Coordinator;
use crate::error::AdvisorError;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    /// Missing or blank starts a new session
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PayloadQuery {
    pub session_id: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

/// Status code and message for an error leaving the coordinator
fn error_response(e: AdvisorError) -> ApiResult {
    let status = match &e {
        AdvisorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        AdvisorError::OptimizationTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_user_facing() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &e {
        AdvisorError::Validation(detail) => detail.clone(),
        e if e.is_user_facing() => e.user_message(),
        e => e.to_string(),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, fatal = e.is_fatal(), "Request failed");
    }
    (status, Json(ApiResponse::error(message)))
}

fn bad_request(message: &str) -> ApiResult {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    session_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ApiState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the caller's handle and forget the session's lock once nobody
    /// else holds or waits on it. Handles are only cloned under the map lock.
    async fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.session_locks.lock().await;
        let idle = locks
            .get(session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if idle {
            locks.remove(session_id);
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Conversation Endpoints
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiResult {
    if req.message.trim().is_empty() {
        return bad_request("message must not be empty");
    }

    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(session_id = %session_id, "Chat request");

    let lock = state.session_lock(&session_id).await;
    let result = {
        let _turn = lock.lock().await;
        state.coordinator.chat(&session_id, &req.message).await
    };
    state.release_session_lock(&session_id, lock).await;

    match result {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::success(response))),
        Err(e) => error_response(e),
    }
}

async fn optimize_handler(
    State(state): State<ApiState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    if req.session_id.trim().is_empty() {
        return bad_request("session_id must not be empty");
    }
    info!(session_id = %req.session_id, "Optimize request");

    let lock = state.session_lock(&req.session_id).await;
    let result = {
        let _turn = lock.lock().await;
        state.coordinator.optimize(&req.session_id).await
    };
    state.release_session_lock(&req.session_id, lock).await;

    match result {
        Ok(allocation) => (StatusCode::OK, Json(ApiResponse::success(allocation))),
        Err(e) => error_response(e),
    }
}

async fn reset_handler(
    State(state): State<ApiState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult {
    if req.session_id.trim().is_empty() {
        return bad_request("session_id must not be empty");
    }

    let lock = state.session_lock(&req.session_id).await;
    let result = {
        let _turn = lock.lock().await;
        state.coordinator.reset(&req.session_id).await
    };
    state.release_session_lock(&req.session_id, lock).await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": req.session_id,
                "reset": true,
            }))),
        ),
        Err(e) => error_response(e),
    }
}

async fn payload_handler(
    State(state): State<ApiState>,
    Query(query): Query<PayloadQuery>,
) -> ApiResult {
    match state.coordinator.payload(&query.session_id).await {
        Ok(context) => (StatusCode::OK, Json(ApiResponse::success(context))),
        Err(e) => error_response(e),
    }
}

async fn audit_handler(
    State(state): State<ApiState>,
    Query(query): Query<PayloadQuery>,
) -> ApiResult {
    match state.coordinator.audit_trail(&query.session_id).await {
        Ok(entries) => (StatusCode::OK, Json(ApiResponse::success(entries))),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    router_with_state(ApiState::new(coordinator))
}

fn router_with_state(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/optimize", post(optimize_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/get-payload", get(payload_handler))
        .route("/api/audit", get(audit_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    coordinator: Arc<Coordinator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        let coordinator = Coordinator::from_config(&AdvisorConfig::default()).unwrap();
        create_router(Arc::new(coordinator))
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&router(), get_uri("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_starts_a_session() {
        let router = router();
        let (status, body) = send(
            &router,
            post_json("/api/chat", json!({ "message": "I want to invest for growth" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["agent"], "currency");
        let session_id = body["data"]["session_id"].as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&session_id).is_ok());

        let (_, body) = send(
            &router,
            post_json("/api/chat", json!({ "session_id": session_id, "message": "USD" })),
        )
        .await;
        assert_eq!(body["data"]["optimization_triggered"], false);

        let (status, body) = send(
            &router,
            get_uri(&format!("/api/get-payload?session_id={}", session_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["currency"], "USD");
    }

    #[tokio::test]
    async fn test_session_locks_are_released_after_each_turn() {
        let coordinator = Coordinator::from_config(&AdvisorConfig::default()).unwrap();
        let state = ApiState::new(Arc::new(coordinator));
        let router = router_with_state(state.clone());

        for _ in 0..3 {
            let (status, _) = send(&router, post_json("/api/chat", json!({ "message": "USD" }))).await;
            assert_eq!(status, StatusCode::OK);
        }
        send(&router, post_json("/api/chat", json!({ "session_id": "s3", "message": "INR" }))).await;
        send(&router, post_json("/api/reset", json!({ "session_id": "s3" }))).await;

        assert!(state.session_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_held_session_lock_survives_release() {
        let coordinator = Coordinator::from_config(&AdvisorConfig::default()).unwrap();
        let state = ApiState::new(Arc::new(coordinator));

        let first = state.session_lock("s").await;
        let second = state.session_lock("s").await;
        assert!(Arc::ptr_eq(&first, &second));

        state.release_session_lock("s", first).await;
        assert!(state.session_locks.lock().await.contains_key("s"));

        state.release_session_lock("s", second).await;
        assert!(state.session_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_audit_for_unknown_session_is_empty() {
        let (status, body) = send(&router(), get_uri("/api/audit?session_id=nobody")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let (status, body) = send(&router(), post_json("/api/chat", json!({ "message": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_optimize_unknown_session_is_not_found() {
        let (status, _) = send(
            &router(),
            post_json("/api/optimize", json!({ "session_id": "nobody" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_optimize_incomplete_session_is_unprocessable() {
        let router = router();
        send(
            &router,
            post_json("/api/chat", json!({ "session_id": "s1", "message": "INR" })),
        )
        .await;

        let (status, body) = send(&router, post_json("/api/optimize", json!({ "session_id": "s1" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_full_session_then_optimize_and_reset() {
        let router = router();
        for message in ["INR", "C", "use defaults"] {
            let (status, _) = send(
                &router,
                post_json("/api/chat", json!({ "session_id": "s2", "message": message })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&router, post_json("/api/optimize", json!({ "session_id": "s2" }))).await;
        assert_eq!(status, StatusCode::OK);
        let weights = body["data"]["weights"].as_array().unwrap();
        let total: f64 = weights.iter().map(|w| w["weight"].as_f64().unwrap()).sum();
        assert!((total - 1.0).abs() < 1e-6);
        let objective = body["data"]["objective"].clone();
        assert!(objective.is_string());

        let (status, body) = send(&router, get_uri("/api/audit?session_id=s2")).await;
        assert_eq!(status, StatusCode::OK);
        let trail = body["data"].as_array().unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|entry| entry["matches_current_context"] == true));
        assert_eq!(trail[1]["objective"], objective);

        let (status, _) = send(&router, post_json("/api/reset", json!({ "session_id": "s2" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&router, get_uri("/api/get-payload?session_id=s2")).await;
        assert!(body["data"]["currency"].is_null());
    }
}
