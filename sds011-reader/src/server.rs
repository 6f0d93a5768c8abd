// SDS011 Reader - Metrics HTTP server
// Licensed under the Apache License, Version 2.0.

//! HTTP endpoints for the metrics sink.
//!
//! The server only reads from the [`MetricsSink`]; the measurement loop is
//! the single writer.

use crate::error::ReaderError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sds011::{Config, MetricsSink};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    sink: Arc<MetricsSink>,
    samples: u32,
    interval_ms: u64,
    start_time: Instant,
}

impl AppState {
    pub fn new(sink: Arc<MetricsSink>, config: &Config) -> Self {
        Self {
            sink,
            samples: config.samples.get(),
            interval_ms: config.interval.as_millis() as u64,
            start_time: Instant::now(),
        }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Bind the listener up front so a bad address fails startup.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ReaderError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ReaderError::Bind { addr, source })
}

/// Serve until `stop` fires (or its sender is dropped).
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    stop: oneshot::Receiver<()>,
) -> Result<(), ReaderError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics endpoint: http://{}/metrics", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = stop.await;
        })
        .await
        .map_err(ReaderError::Server)
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>SDS011 Reader</title></head>
<body>
    <h1>SDS011 Reader</h1>
    <p>Particulate matter readings from an SDS011 sensor.</p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics (<code>pm25</code>, <code>pm10</code>)</li>
        <li><a href="/health">/health</a> - Health check</li>
        <li><a href="/status">/status</a> - Status information (JSON)</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.sink.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.sink.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    version: String,
    uptime_secs: u64,
    samples: u32,
    interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<LatestValues>,
}

/// Latest published gauge values.
#[derive(Debug, Serialize)]
pub struct LatestValues {
    pm25: f64,
    pm10: f64,
    updates: u64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let latest = state.sink.snapshot().map(|snap| LatestValues {
        pm25: snap.pm25,
        pm10: snap.pm10,
        updates: snap.updates,
    });

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        samples: state.samples,
        interval_ms: state.interval_ms,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use sds011::Measurement;

    fn state() -> Arc<AppState> {
        let sink = Arc::new(MetricsSink::new().unwrap());
        Arc::new(AppState::new(sink, &Config::default()))
    }

    fn measurement(pm25: f64, pm10: f64) -> Measurement {
        Measurement {
            pm25,
            pm10,
            timestamp: None,
        }
    }

    async fn body_string(body: Body) -> String {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_handler_exposes_gauges() {
        let state = state();
        state.sink.update(&measurement(12.5, 30.0));

        let response = metrics_handler(State(Arc::clone(&state))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let body = body_string(response.into_body()).await;
        assert!(body.contains("pm25 12.5"));
        assert!(body.contains("pm10 30"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response.into_body()).await, "OK");
    }

    #[tokio::test]
    async fn test_status_before_first_measurement() {
        let Json(status) = status_handler(State(state())).await;
        assert!(status.latest.is_none());
        assert_eq!(status.samples, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("latest").is_none());
        assert_eq!(json["interval_ms"], 0);
    }

    #[tokio::test]
    async fn test_status_reports_latest_values() {
        let state = state();
        state.sink.update(&measurement(1.0, 2.0));
        state.sink.update(&measurement(3.0, 4.0));

        let Json(status) = status_handler(State(state)).await;
        let latest = status.latest.unwrap();
        assert_eq!(latest.pm25, 3.0);
        assert_eq!(latest.pm10, 4.0);
        assert_eq!(latest.updates, 2);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let listener = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(serve(listener, state(), stop_rx));

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let first = bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
        let addr = first.local_addr().unwrap();
        assert!(matches!(bind(addr).await, Err(ReaderError::Bind { .. })));
    }
}
