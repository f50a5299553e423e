//! # Prometheus Metrics
//!
//! Operational metrics for the tracker server, scraped by Prometheus at
//! the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use scholar_tracker::chain::AggregationStats;
use std::sync::Arc;

/// Holds all Prometheus metric handles for the tracker server.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it
/// can be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct TrackerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of sync requests received (both POST and GET).
    pub sync_requests_total: IntCounter,
    /// Total number of sync requests rejected for a missing token or payload.
    pub sync_rejections_total: IntCounter,
    /// Total number of sync requests the identity provider turned away.
    pub sync_auth_failures_total: IntCounter,
    /// Total number of sync requests that died inside the record store.
    pub sync_store_failures_total: IntCounter,
    /// Number of distinct users with a persisted roster.
    pub rosters_stored: IntGauge,
    /// Total number of balance reads attempted against the ledger.
    pub balance_reads_total: IntCounter,
    /// Total number of balance reads that came back failed.
    pub balance_read_failures_total: IntCounter,
    /// Balance lookups served from the staleness cache without a remote read.
    pub balance_cache_hits_total: IntCounter,
    /// Histogram of sync request handling latency in seconds.
    pub sync_latency_seconds: Histogram,
}

impl TrackerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("tracker".into()), None)
            .expect("failed to create prometheus registry");

        let sync_requests_total = IntCounter::new(
            "sync_requests_total",
            "Total number of roster sync requests received",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sync_requests_total.clone()))
            .expect("metric registration");

        let sync_rejections_total = IntCounter::new(
            "sync_rejections_total",
            "Sync requests rejected for a missing token or payload",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sync_rejections_total.clone()))
            .expect("metric registration");

        let sync_auth_failures_total = IntCounter::new(
            "sync_auth_failures_total",
            "Sync requests rejected by the identity provider",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sync_auth_failures_total.clone()))
            .expect("metric registration");

        let sync_store_failures_total = IntCounter::new(
            "sync_store_failures_total",
            "Sync requests that failed inside the record store",
        )
        .expect("metric creation");
        registry
            .register(Box::new(sync_store_failures_total.clone()))
            .expect("metric registration");

        let rosters_stored = IntGauge::new(
            "rosters_stored",
            "Number of distinct users with a persisted roster",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rosters_stored.clone()))
            .expect("metric registration");

        let balance_reads_total = IntCounter::new(
            "balance_reads_total",
            "Total number of on-chain balance reads attempted",
        )
        .expect("metric creation");
        registry
            .register(Box::new(balance_reads_total.clone()))
            .expect("metric registration");

        let balance_read_failures_total = IntCounter::new(
            "balance_read_failures_total",
            "Balance reads that resolved as failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(balance_read_failures_total.clone()))
            .expect("metric registration");

        let balance_cache_hits_total = IntCounter::new(
            "balance_cache_hits_total",
            "Balance lookups answered from the staleness cache",
        )
        .expect("metric creation");
        registry
            .register(Box::new(balance_cache_hits_total.clone()))
            .expect("metric registration");

        let sync_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sync_latency_seconds",
                "End-to-end sync request handling latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(sync_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            sync_requests_total,
            sync_rejections_total,
            sync_auth_failures_total,
            sync_store_failures_total,
            rosters_stored,
            balance_reads_total,
            balance_read_failures_total,
            balance_cache_hits_total,
            sync_latency_seconds,
        }
    }

    /// Folds an aggregation pass into the balance counters.
    pub fn record_aggregation(&self, stats: &AggregationStats) {
        self.balance_reads_total.inc_by(stats.remote_reads);
        self.balance_read_failures_total.inc_by(stats.failed_reads);
        self.balance_cache_hits_total.inc_by(stats.cache_hits);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        prometheus::Encoder::encode(&encoder, &metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for TrackerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via state.
pub type SharedMetrics = Arc<TrackerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scholar_tracker::chain::{BalanceAggregator, BalanceReader, BalanceResult, TokenKind};
    use std::time::Duration;

    struct DeadLedger;

    #[async_trait]
    impl BalanceReader for DeadLedger {
        async fn read(&self, address: &str, token: TokenKind) -> BalanceResult {
            BalanceResult::failed(address, token)
        }
    }

    #[test]
    fn exposition_carries_the_namespace() {
        let metrics = TrackerMetrics::new();
        metrics.sync_requests_total.inc();
        metrics.rosters_stored.set(3);

        let body = metrics.encode().expect("encode");
        assert!(body.contains("tracker_sync_requests_total 1"));
        assert!(body.contains("tracker_rosters_stored 3"));
    }

    #[tokio::test]
    async fn aggregation_outcomes_land_in_the_balance_counters() {
        let aggregator = BalanceAggregator::with_limits(DeadLedger, 4, Duration::from_secs(300));
        let views = aggregator
            .aggregate(["0xabc1057399f2ffa37ab15a83b41c0e14b2b9f601".to_string()])
            .collect_all()
            .await;
        assert_eq!(views.len(), 1);

        let metrics = TrackerMetrics::new();
        metrics.record_aggregation(&aggregator.stats());

        let body = metrics.encode().expect("encode");
        assert!(body.contains("tracker_balance_reads_total 3"));
        assert!(body.contains("tracker_balance_read_failures_total 3"));
        assert!(body.contains("tracker_balance_cache_hits_total 0"));
    }

    #[test]
    fn latency_histogram_observes() {
        let metrics = TrackerMetrics::new();
        metrics.sync_latency_seconds.observe(0.02);

        let body = metrics.encode().expect("encode");
        assert!(body.contains("tracker_sync_latency_seconds_count 1"));
    }
}
