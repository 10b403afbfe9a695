//! Prometheus metrics for the profilecache server.
//!
//! This module provides:
//! - HTTP request metrics (count, latency) labelled by route template
//! - Profile cache hit/miss counters
//! - Identity provider fetch outcomes and score increments

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Profile cache metrics
    pub const PROFILE_CACHE_HITS_TOTAL: &str = "profile_cache_hits_total";
    pub const PROFILE_CACHE_MISSES_TOTAL: &str = "profile_cache_misses_total";
    pub const IDENTITY_FETCHES_TOTAL: &str = "identity_fetches_total";
    pub const SCORE_INCREMENTS_TOTAL: &str = "score_increments_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Use install_recorder() for pull-based metrics (we serve /metrics ourselves)
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request. `route` is the matched route template, never the raw path.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status_class" => status_class(status)
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

// =============================================================================
// Profile Metrics
// =============================================================================

/// Record a profile served straight from the store.
pub fn record_cache_hit() {
    counter!(names::PROFILE_CACHE_HITS_TOTAL).increment(1);
}

/// Record a store lookup that fell through to the identity provider.
///
/// `reason` is `"miss"` or `"malformed"`.
pub fn record_cache_miss(reason: &'static str) {
    counter!(names::PROFILE_CACHE_MISSES_TOTAL, "reason" => reason).increment(1);
}

/// Record an identity provider fetch by outcome (`ok`, `not_found`, `auth`, `transient`).
pub fn record_identity_fetch(outcome: &'static str) {
    counter!(names::IDENTITY_FETCHES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_score_increment() {
    counter!(names::SCORE_INCREMENTS_TOTAL).increment(1);
}
