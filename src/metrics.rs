//! Prometheus metrics: one process-wide recorder plus the `/metrics` route.
//!
//! Recording helpers are no-ops until `Metrics::init` has run, so library code
//! and tests can call them freely.

use std::sync::OnceLock;

use axum::{routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder (first call wins) and publish
    /// the knowledge-base size.
    pub fn init(knowledge_diseases: usize) -> Self {
        let handle = HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(h) => h,
                Err(e) => {
                    // Another recorder is already global; render an empty local one.
                    warn!(target: "healthtrack::metrics", error = %e, "prometheus recorder not installed");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            })
            .clone();

        set_knowledge_size(knowledge_diseases);
        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// `outcome`: `ok`, `unknown` or `invalid`.
pub fn record_prediction(outcome: &'static str, elapsed_ms: f64) {
    counter!("healthtrack_predictions_total", "outcome" => outcome).increment(1);
    histogram!("healthtrack_predict_duration_ms").record(elapsed_ms);
}

pub fn record_auth(event: &'static str, outcome: &'static str) {
    counter!("healthtrack_auth_total", "event" => event, "outcome" => outcome).increment(1);
}

pub fn record_records(op: &'static str) {
    counter!("healthtrack_records_total", "op" => op).increment(1);
}

pub fn set_knowledge_size(diseases: usize) {
    gauge!("healthtrack_knowledge_diseases").set(diseases as f64);
}
