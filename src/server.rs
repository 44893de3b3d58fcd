//! HTTP adapter: expose the pipeline as `POST /api/analyze`.
//!
//! This layer only parses the body, calls [`crate::analyze::analyze_request`]
//! and maps the outcome to a status code:
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | Parsed / Unparsed result | 200 | the [`ExtractedResult`](crate::ExtractedResult) |
//! | input or fetch error | 400 | `{ error, detail?, url?, status? }` |
//! | inference or internal error | 500 | `{ error, detail? }` |
//! | body is not JSON | 400 | `{ error: "Invalid JSON", detail }` |
//! | any method but POST | 405 | `{ error: "POST only" }` |
//!
//! `/api/gemini` is kept as an alias of `/api/analyze` for existing clients.

use crate::analyze::analyze_request;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::input::AnalysisRequest;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared handler state: the immutable config loaded at start-up.
pub type AppState = Arc<AnalysisConfig>;

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}

/// Build the router. Exposed separately from [`serve`] for tests.
pub fn router(config: AppState) -> Router {
    Router::new()
        .route("/api/analyze", analyze_route())
        .route("/api/gemini", analyze_route())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(config)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, config: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Listening on http://{} (model {})",
        listener.local_addr()?,
        config.model
    );
    axum::serve(listener, router(config)).await
}

fn analyze_route() -> MethodRouter<AppState> {
    post(analyze_handler).fallback(method_not_allowed)
}

async fn analyze_handler(State(config): State<AppState>, body: Bytes) -> Response {
    let request = match parse_body(&body) {
        Ok(req) => req,
        Err(detail) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON", "detail": detail })),
            )
                .into_response()
        }
    };

    match analyze_request(&request, &config).await {
        Ok(output) => {
            debug!("Responding 200 ({:?})", output.result.kind());
            (StatusCode::OK, Json(output.result)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Parse the request body. Non-object JSON is treated as a body without image keys.
fn parse_body(body: &[u8]) -> Result<AnalysisRequest, String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    match value {
        Value::Object(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        _ => Ok(AnalysisRequest::default()),
    }
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "POST only" })),
    )
        .into_response()
}

async fn health(State(config): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "model": config.model }))
}
