//! Diagnostics endpoints: health probes and metrics
//!
//! Two plain-HTTP listeners, matching the deployment manifest: the health
//! probe address serves /healthz and /readyz, the metrics address serves
//! /metrics. Both probes are backed by the webhook server's started state,
//! so the pod only reports ready once admission is actually servable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metal3_common::Error;

use crate::metrics::Metrics;

/// Shared probe state
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    webhook_started: Arc<AtomicBool>,
}

impl HealthState {
    /// Mark the webhook server as serving
    pub fn set_webhook_started(&self) {
        self.webhook_started.store(true, Ordering::SeqCst);
    }

    /// Whether the webhook server is serving
    pub fn webhook_started(&self) -> bool {
        self.webhook_started.load(Ordering::SeqCst)
    }
}

async fn probe_handler(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.webhook_started() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "webhook server not started")
    }
}

/// Router for /healthz and /readyz
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(probe_handler))
        .route("/readyz", get(probe_handler))
        .with_state(state)
}

async fn metrics_handler(State(metrics): State<Metrics>) -> (StatusCode, String) {
    match metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Router for /metrics
pub fn metrics_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

/// Serve a router until the run context is cancelled
pub async fn serve(
    name: &'static str,
    addr: String,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::internal(name, format!("failed to bind {addr}: {e}")))?;
    info!(server = %name, addr = %addr, "Diagnostics server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| Error::internal(name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn probes_report_unavailable_until_the_webhook_starts() {
        let state = HealthState::default();
        let router = health_router(state.clone());

        let resp = router
            .clone()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_webhook_started();
        let resp = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_the_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics
            .reconciliations
            .with_label_values(&["Metal3Cluster", "success"])
            .inc();
        let router = metrics_router(metrics);

        let resp = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
