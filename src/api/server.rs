use crate::api::server_config::*;
use axum::{
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{limit::ConcurrencyLimitLayer, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::{handlers, stream};
use crate::monitor::Monitor;
use axum::error_handling::HandleErrorLayer;
use tower::BoxError;

/// Build the HTTP/WebSocket relay over a shared monitor
pub fn create_router(monitor: Arc<Monitor>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/blacklist", get(handlers::blacklist))
        .route("/api/attacks", get(handlers::attacks))
        .route("/api/ml-detections", get(handlers::ml_detections))
        .route("/api/recovery/trigger", post(handlers::trigger_recovery))
        .route("/api/recovery/exit", post(handlers::exit_recovery))
        .route("/api/simulate/attack", post(handlers::simulate_attack))
        .route("/api/events", post(handlers::ingest_event))
        .route("/api/metrics", get(handlers::metrics))
        .route("/api/stream", get(stream::websocket_handler))
        .layer(
            ServiceBuilder::new()
                // Convert middleware errors (timeout/overload) into HTTP responses
                .layer(HandleErrorLayer::new(|err: BoxError| async move {
                    if err.is::<tower::timeout::error::Elapsed>() {
                        (StatusCode::REQUEST_TIMEOUT, "request timed out")
                    } else {
                        (StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
                    }
                }))
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENCY))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(TraceLayer::new_for_http()),
        )
        .layer(cors_layer)
        .with_state(monitor)
}

pub struct MonitorServer {
    pub monitor: Arc<Monitor>,
    pub host: String,
    pub port: u16,
}

impl MonitorServer {
    pub fn new(monitor: Arc<Monitor>, host: impl Into<String>, port: u16) -> Self {
        Self {
            monitor,
            host: host.into(),
            port,
        }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        let app = create_router(Arc::clone(&self.monitor));
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!("Server listening on {}", addr);
        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("Server stopped");
        Ok(())
    }
}
