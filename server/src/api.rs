//! # Sync REST API
//!
//! Builds the axum router that exposes the tracker's HTTP interface.
//! All endpoints share application state through axum's `State`
//! extractor.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description                                  |
//! |--------|-----------|----------------------------------------------|
//! | GET    | `/health` | Liveness probe                               |
//! | POST   | `/sync`   | Replace the caller's roster, echo the stored |
//! | GET    | `/sync`   | Fetch the caller's roster                    |
//!
//! Both `/sync` routes authenticate via a raw bearer token in the
//! `Authorization` header. Error bodies are `{ "error": "<message>" }`
//! with the status chosen by the failure class: 400 for a request the
//! caller got wrong, 401 for a token the identity provider turned away,
//! 500 when the store is the problem.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use scholar_tracker::auth::IdentityVerifier;
use scholar_tracker::store::SledRecordStore;
use scholar_tracker::sync::{SyncError, SyncService};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` or sled handles.
pub struct AppState<V> {
    /// The server's reported version string.
    pub version: String,
    /// Roster sync service over the identity provider and record store.
    pub sync: Arc<SyncService<V, SledRecordStore>>,
    /// Store handle kept alongside the service for gauge refreshes.
    pub store: SledRecordStore,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl<V> Clone for AppState<V> {
    fn clone(&self) -> Self {
        Self {
            version: self.version.clone(),
            sync: Arc::clone(&self.sync),
            store: self.store.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router<V>(state: AppState<V>) -> Router
where
    V: IdentityVerifier + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/sync", post(post_sync_handler::<V>).get(get_sync_handler::<V>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Request body for `POST /sync`. The roster itself is opaque JSON the
/// clients own; the server never looks inside it.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// The full replacement roster. Absent means the request is malformed.
    #[serde(default)]
    pub scholars: Option<serde_json::Value>,
}

/// Response body for both `/sync` routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    /// The roster as persisted, round-tripped through the store.
    pub scholars: serde_json::Value,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the server is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch the store or the identity provider.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `POST /sync` — replaces the caller's roster wholesale.
///
/// The stored roster is read back and echoed, so the 200 body reflects
/// durable state rather than the request. A body that is missing,
/// non-JSON, or lacks the `scholars` field is rejected only after the
/// token has been resolved; request validation order matches what the
/// clients were built against.
async fn post_sync_handler<V>(
    State(state): State<AppState<V>>,
    headers: HeaderMap,
    body: Option<Json<SyncRequest>>,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let started = std::time::Instant::now();
    state.metrics.sync_requests_total.inc();

    let scholars = body.and_then(|Json(req)| req.scholars);
    let outcome = state.sync.post(bearer_token(&headers), scholars).await;

    let response = match outcome {
        Ok(document) => {
            state.metrics.rosters_stored.set(state.store.record_count() as i64);
            (
                StatusCode::OK,
                Json(SyncResponse {
                    scholars: document.scholars,
                }),
            )
                .into_response()
        }
        Err(e) => sync_error_response(&state.metrics, e),
    };

    state
        .metrics
        .sync_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    response
}

/// `GET /sync` — fetches the caller's roster.
///
/// A user who has never posted gets `{ "scholars": [] }` with a 200;
/// that is a successful empty state, not a 404.
async fn get_sync_handler<V>(
    State(state): State<AppState<V>>,
    headers: HeaderMap,
) -> Response
where
    V: IdentityVerifier + 'static,
{
    let started = std::time::Instant::now();
    state.metrics.sync_requests_total.inc();

    let response = match state.sync.get(bearer_token(&headers)).await {
        Ok(document) => (
            StatusCode::OK,
            Json(SyncResponse {
                scholars: document.scholars,
            }),
        )
            .into_response(),
        Err(e) => sync_error_response(&state.metrics, e),
    };

    state
        .metrics
        .sync_latency_seconds
        .observe(started.elapsed().as_secs_f64());
    response
}

/// Pulls the raw bearer token out of the `Authorization` header.
/// Non-UTF-8 header values are treated as absent.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Maps a [`SyncError`] to its HTTP status, records the failure class,
/// and renders the `{ "error": … }` body.
fn sync_error_response(metrics: &SharedMetrics, error: SyncError) -> Response {
    let status = match &error {
        SyncError::MissingAuthToken | SyncError::MissingPayload => {
            metrics.sync_rejections_total.inc();
            StatusCode::BAD_REQUEST
        }
        SyncError::Unauthenticated => {
            metrics.sync_auth_failures_total.inc();
            StatusCode::UNAUTHORIZED
        }
        SyncError::Store(_) | SyncError::Codec(_) => {
            metrics.sync_store_failures_total.inc();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        tracing::error!(%error, "sync request failed");
    } else {
        tracing::debug!(%error, "sync request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
