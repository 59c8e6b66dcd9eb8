use crate::error::{RateLimitError, Result};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            RateLimitError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "ratelimit_requests_total",
            "Requests evaluated by the rate limiter, by policy and outcome"
        );
        describe_counter!(
            "ratelimit_exceeded_total",
            "Requests rejected because the policy window was exhausted"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record a counted request
pub fn record_decision(policy: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!(
        "ratelimit_requests_total",
        "policy" => policy.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    if !allowed {
        counter!("ratelimit_exceeded_total", "policy" => policy.to_string()).increment(1);
    }
}

/// Record a request that was not counted (skipped policy or no identity)
pub fn record_bypass(policy: &str) {
    counter!(
        "ratelimit_requests_total",
        "policy" => policy.to_string(),
        "outcome" => "bypass"
    )
    .increment(1);
}
