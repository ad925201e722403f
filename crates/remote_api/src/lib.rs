//! Endpoint description servlet, mounted under a configurable path.
//!
//! Endpoints:
//! - GET  {path}/endpoints
//! - GET  {path}/endpoint/{uid}
//! - POST {path}   (discovery answers: JSON array of descriptions)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info, warn};

use remote_core::{ExportDispatcher, ImportsRegistry};
use remote_model::EndpointDescription;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared state of the servlet handlers.
pub struct ServletState {
    pub dispatcher: Arc<ExportDispatcher>,
    pub registry: Arc<ImportsRegistry>,
    pub servlet_path: String,
}

/// Mount point without trailing slash; empty for the root.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

pub fn build_router(state: Arc<ServletState>) -> Router {
    let base = normalize_path(&state.servlet_path);
    let root = if base.is_empty() { "/".to_string() } else { base.clone() };

    Router::new()
        .route(&root, post(handle_discovered))
        .route(&format!("{base}/endpoints"), get(handle_endpoints))
        .route(&format!("{base}/endpoint"), get(handle_missing_uid))
        .route(&format!("{base}/endpoint/"), get(handle_missing_uid))
        .route(&format!("{base}/endpoint/{{uid}}"), get(handle_endpoint))
        .fallback(handle_not_found)
        .with_state(state)
}

async fn handle_endpoints(
    State(state): State<Arc<ServletState>>,
) -> Json<Vec<EndpointDescription>> {
    let descriptions = state
        .dispatcher
        .endpoints()
        .iter()
        .map(EndpointDescription::from)
        .collect();
    Json(descriptions)
}

async fn handle_endpoint(
    State(state): State<Arc<ServletState>>,
    Path(uid): Path<String>,
) -> Result<Json<EndpointDescription>, StatusCode> {
    match state.dispatcher.endpoint(&uid) {
        Some(endpoint) => Ok(Json(EndpointDescription::from(&endpoint))),
        None => {
            debug!(%uid, "endpoint requested but unknown");
            Err(StatusCode::NOT_FOUND)
        }
    }
}

async fn handle_missing_uid() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "Endpoint UID is missing")
}

async fn handle_not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Endpoints sent by a peer answering our discovery packet. Every element is
/// parsed before anything is imported.
async fn handle_discovered(State(state): State<Arc<ServletState>>, request: Request) -> Response {
    let caller = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let body: Bytes = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to read discovery answer");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error reading body: {e}"))
                .into_response();
        }
    };

    let descriptions: Vec<EndpointDescription> = match serde_json::from_slice(&body) {
        Ok(descriptions) => descriptions,
        Err(e) => {
            warn!(caller = ?caller, error = %e, "malformed discovery answer");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error parsing endpoints: {e}"),
            )
                .into_response();
        }
    };

    let received = descriptions.len();
    let added = descriptions
        .into_iter()
        .map(|description| description.into_import_endpoint(caller.as_deref()))
        .map(|endpoint| state.registry.add(endpoint))
        .filter(|added| *added)
        .count();
    info!(caller = ?caller, received, added, "discovery answer received");

    (StatusCode::OK, "OK").into_response()
}
