use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    metrics::GatewayMetrics,
    registry::{CodeError, CodeRegistry},
    relay::RelayEngine,
    rooms::RoomDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CodeRegistry>,
    pub rooms: Arc<RoomDirectory>,
    pub relay: Arc<RelayEngine>,
    pub metrics: Arc<GatewayMetrics>,
    pub config: ServerConfig,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    success: bool,
    code: String,
    #[serde(rename = "roomId")]
    room_id: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    success: bool,
    message: &'static str,
    #[serde(rename = "roomId", skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    /// A missing or null `code` is still a well-formed request; it verifies
    /// as the empty candidate and fails as "Invalid code", not "Invalid
    /// JSON".
    #[serde(default)]
    code: Option<CodeField>,
}

/// The original client sends the code as either a JSON string or a bare
/// number; both are accepted and normalized to the 4-digit string form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeField {
    Text(String),
    Number(u64),
}

impl VerifyRequest {
    fn candidate(&self) -> String {
        match &self.code {
            Some(CodeField::Text(s)) => s.clone(),
            Some(CodeField::Number(n)) => n.to_string(),
            None => String::new(),
        }
    }
}

// GET /generate-code
pub async fn generate_code(State(state): State<AppState>) -> Response {
    let start = Instant::now();

    let response = match state.registry.generate() {
        Ok(issued) => {
            state.rooms.create(&issued.room_id);
            state.metrics.codes_generated.inc();
            info!(code = %issued.code, room = %issued.room_id, "generated pairing code");
            (
                StatusCode::OK,
                Json(GenerateResponse {
                    success: true,
                    code: issued.code,
                    room_id: issued.room_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "code generation failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(VerifyResponse {
                    success: false,
                    message: "No codes available",
                    room_id: None,
                }),
            )
                .into_response()
        }
    };

    state.metrics.outstanding_codes.set(state.registry.outstanding() as f64);
    state.metrics.active_rooms.set(state.rooms.len() as f64);
    state.metrics.request_latency.observe(start.elapsed().as_secs_f64());
    response
}

// POST /verify-code
pub async fn verify_code(State(state): State<AppState>, body: Bytes) -> Response {
    let start = Instant::now();

    let request: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            state.metrics.codes_rejected.inc();
            return (
                StatusCode::BAD_REQUEST,
                Json(VerifyResponse {
                    success: false,
                    message: "Invalid JSON",
                    room_id: None,
                }),
            )
                .into_response();
        }
    };

    let candidate = request.candidate();
    let response = match state.registry.verify(&candidate) {
        Ok(room_id) => {
            state.metrics.codes_verified.inc();
            info!(code = %candidate, room = %room_id, "verified pairing code");
            (
                StatusCode::OK,
                Json(VerifyResponse {
                    success: true,
                    message: "Code is valid",
                    room_id: Some(room_id),
                }),
            )
                .into_response()
        }
        Err(CodeError::Invalid | CodeError::Expired | CodeError::Exhausted) => {
            state.metrics.codes_rejected.inc();
            info!(code = %candidate, "failed verification");
            (
                StatusCode::BAD_REQUEST,
                Json(VerifyResponse {
                    success: false,
                    message: "Invalid code",
                    room_id: None,
                }),
            )
                .into_response()
        }
    };

    state.metrics.outstanding_codes.set(state.registry.outstanding() as f64);
    state.metrics.request_latency.observe(start.elapsed().as_secs_f64());
    response
}

// GET /health
pub async fn get_health(State(_state): State<AppState>) -> Response {
    use serde_json::json;

    let response = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, Json(response)).into_response()
}

// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let prometheus = state.metrics.export_prometheus();
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus,
    )
        .into_response()
}

/// Fallback for unmatched routes.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Browser clients are served from arbitrary origins: every response carries
/// permissive CORS headers, and preflight requests are answered 204 with no
/// body.
pub async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
