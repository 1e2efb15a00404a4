//! # Prometheus Metrics
//!
//! Ledger activity as seen by the API: how many write operations ran and
//! failed (by method), how long they took, and the size of the ledger after
//! the last one. Served as text on the metrics port under `/metrics`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use trove_protocol::Engine;

/// Metric handles, registered in a private registry prefixed `trove_`.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Write operations attempted, labeled by RPC method.
    pub operations_total: IntCounterVec,
    /// Write operations the ledger refused, labeled by method and error kind.
    pub operations_failed_total: IntCounterVec,
    pub baskets_total: IntGauge,
    pub events_total: IntGauge,
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("trove".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger write operations received"),
            &["method"],
        )?;
        let operations_failed_total = IntCounterVec::new(
            Opts::new("operations_failed_total", "Ledger write operations refused"),
            &["method", "kind"],
        )?;
        let baskets_total = IntGauge::new("baskets_total", "Baskets on the ledger")?;
        let events_total = IntGauge::new("events_total", "Records in the ledger event log")?;
        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("operation_latency_seconds", "Time spent applying a write operation")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operations_failed_total.clone()))?;
        registry.register(Box::new(baskets_total.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operations_failed_total,
            baskets_total,
            events_total,
            operation_latency_seconds,
        })
    }

    /// Refreshes the ledger-size gauges.
    pub fn observe_ledger(&self, engine: &Engine) {
        self.baskets_total.set(engine.baskets().count() as i64);
        self.events_total.set(i64::try_from(engine.events().next_sequence()).unwrap_or(i64::MAX));
    }

    /// Prometheus text exposition of every metric.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_carries_prefix_and_labels() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.operations_total.with_label_values(&["trove_issue"]).inc();
        metrics
            .operations_failed_total
            .with_label_values(&["trove_issue", "InsufficientAllowance"])
            .inc();
        metrics.baskets_total.set(2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("trove_operations_total{method=\"trove_issue\"} 1"));
        assert!(text.contains("kind=\"InsufficientAllowance\""));
        assert!(text.contains("trove_baskets_total 2"));
    }
}
