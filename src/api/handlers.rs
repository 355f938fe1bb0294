//! REST handlers. Each one is a thin call into the monitor.

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::monitor::{Monitor, MonitorError, RawActivity, SIMULATED_ATTACKER};

/// Error wrapper mapping monitor errors onto HTTP status codes
#[derive(Debug)]
pub struct ApiError(pub MonitorError);

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MonitorError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MonitorError::Configuration(_) | MonitorError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// GET /api/status
pub async fn status(State(monitor): State<Arc<Monitor>>) -> Response {
    Json(json!({
        "status": "Self-Healing Blockchain Network API is running",
        "monitor": monitor.status(),
    }))
    .into_response()
}

/// GET /api/blacklist
pub async fn blacklist(State(monitor): State<Arc<Monitor>>) -> Response {
    Json(json!({ "blacklistedAddresses": monitor.blacklist() })).into_response()
}

/// GET /api/attacks
pub async fn attacks(State(monitor): State<Arc<Monitor>>) -> Response {
    let limit = monitor.config().history.recent_default;
    Json(json!({ "recentAttacks": monitor.recent_attacks(limit) })).into_response()
}

/// GET /api/ml-detections
pub async fn ml_detections(State(monitor): State<Arc<Monitor>>) -> Response {
    let limit = monitor.config().history.recent_default;
    Json(json!({ "recentMLDetections": monitor.recent_ml_detections(limit) })).into_response()
}

/// POST /api/recovery/trigger
pub async fn trigger_recovery(State(monitor): State<Arc<Monitor>>) -> Response {
    let outcome = monitor.trigger_recovery();
    let message = if outcome.changed {
        "Recovery mode triggered successfully"
    } else {
        "Recovery mode already active"
    };
    Json(json!({ "message": message, "recovery": outcome })).into_response()
}

/// POST /api/recovery/exit
pub async fn exit_recovery(State(monitor): State<Arc<Monitor>>) -> Response {
    let outcome = monitor.exit_recovery();
    let message = if outcome.changed {
        "Exited recovery mode"
    } else {
        "Recovery mode not active"
    };
    Json(json!({ "message": message, "recovery": outcome })).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    #[serde(rename = "type")]
    pub attack_type: Option<String>,
    pub address: Option<String>,
}

/// POST /api/simulate/attack
pub async fn simulate_attack(
    State(monitor): State<Arc<Monitor>>,
    body: Option<Json<SimulateRequest>>,
) -> Response {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let finding = monitor.simulate(
        request.attack_type.as_deref().unwrap_or_default(),
        request.address.as_deref().unwrap_or(SIMULATED_ATTACKER),
    );
    let message = format!("Simulated {} from {}", finding.finding_type, finding.address);
    info!("{}", message);
    Json(json!({ "message": message, "attack": finding })).into_response()
}

/// POST /api/events
pub async fn ingest_event(
    State(monitor): State<Arc<Monitor>>,
    Json(raw): Json<RawActivity>,
) -> Result<Response, ApiError> {
    let report = monitor.ingest_raw(raw)?;
    Ok(Json(report).into_response())
}

/// GET /api/metrics
pub async fn metrics(State(monitor): State<Arc<Monitor>>) -> Result<Response, ApiError> {
    let body = monitor.metrics().export()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
