//! Observability infrastructure for the StrokeWatch service
//!
//! Provides:
//! - Prometheus metrics (prediction latency and outcomes, artifact lifecycle, board size)
//! - Structured JSON logging of domain events with tracing

use crate::artifacts::ArtifactStats;
use crate::models::Category;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    prediction_latency_seconds: HistogramVec,
    predictions_served: IntCounterVec,
    prediction_errors: IntCounterVec,
    artifacts_stored: IntCounter,
    artifacts_tracked: IntGauge,
    artifacts_deleted: IntGauge,
    artifact_delete_failures: IntGauge,
    posts: IntGaugeVec,
    post_likes: IntCounter,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram_vec!(
                "strokewatch_prediction_latency_seconds",
                "Time spent in the inference gateway per prediction",
                &["backend"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_served: register_int_counter_vec!(
                "strokewatch_predictions_total",
                "Predictions returned to clients",
                &["backend"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "strokewatch_prediction_errors_total",
                "Predictions that failed, by error kind",
                &["backend", "kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            artifacts_stored: register_int_counter!(
                "strokewatch_artifacts_stored_total",
                "Uploaded artifacts written to the upload directory"
            )
            .expect("Failed to register artifacts_stored_total"),

            artifacts_tracked: register_int_gauge!(
                "strokewatch_artifacts_tracked",
                "Uploaded artifacts awaiting deletion"
            )
            .expect("Failed to register artifacts_tracked"),

            artifacts_deleted: register_int_gauge!(
                "strokewatch_artifacts_deleted",
                "Uploaded artifacts removed from disk since startup"
            )
            .expect("Failed to register artifacts_deleted"),

            artifact_delete_failures: register_int_gauge!(
                "strokewatch_artifact_delete_failures",
                "Artifact deletions since startup that failed and were left for the sweeper"
            )
            .expect("Failed to register artifact_delete_failures"),

            posts: register_int_gauge_vec!(
                "strokewatch_posts",
                "Posts currently on the community board",
                &["category"]
            )
            .expect("Failed to register posts"),

            post_likes: register_int_counter!(
                "strokewatch_post_likes_total",
                "Likes recorded on community posts"
            )
            .expect("Failed to register post_likes_total"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the process-wide metrics; clones share the same
/// underlying collectors.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_prediction(&self, backend: &str, duration_secs: f64) {
        let inner = self.inner();
        inner
            .prediction_latency_seconds
            .with_label_values(&[backend])
            .observe(duration_secs);
        inner.predictions_served.with_label_values(&[backend]).inc();
    }

    pub fn inc_prediction_errors(&self, backend: &str, kind: &str) {
        self.inner()
            .prediction_errors
            .with_label_values(&[backend, kind])
            .inc();
    }

    pub fn inc_artifacts_stored(&self) {
        self.inner().artifacts_stored.inc();
    }

    /// Mirror the artifact manager's counters
    pub fn set_artifact_stats(&self, stats: &ArtifactStats) {
        let inner = self.inner();
        inner.artifacts_tracked.set(stats.tracked as i64);
        inner.artifacts_deleted.set(stats.deleted as i64);
        inner.artifact_delete_failures.set(stats.failed as i64);
    }

    pub fn set_post_counts(&self, counts: &[(Category, usize)]) {
        for (category, count) in counts {
            self.inner()
                .posts
                .with_label_values(&[category.as_str()])
                .set(*count as i64);
        }
    }

    pub fn inc_post_likes(&self) {
        self.inner().post_likes.inc();
    }
}

/// Structured logger for service events
///
/// Every event carries an `event` field and the service instance name so
/// JSON log lines can be filtered without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_prediction(&self, backend: &str, risk_percentage: f32, label: Option<&str>, elapsed_ms: u128) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            backend = %backend,
            risk_percentage = risk_percentage,
            label = ?label,
            elapsed_ms = elapsed_ms,
            "Served risk prediction"
        );
    }

    pub fn log_prediction_failed(&self, backend: &str, error: &str) {
        warn!(
            event = "prediction_failed",
            instance = %self.instance,
            backend = %backend,
            error = %error,
            "Prediction failed"
        );
    }

    pub fn log_artifact_stored(&self, path: &Path, original_filename: &str, size_bytes: usize) {
        info!(
            event = "artifact_stored",
            instance = %self.instance,
            path = %path.display(),
            original_filename = %original_filename,
            size_bytes = size_bytes,
            "Stored uploaded artifact"
        );
    }

    /// `trigger` names what asked for the deletion (`request`, `scheduled`, `sweeper`, `shutdown`)
    pub fn log_artifact_deleted(&self, path: &Path, trigger: &str, already_absent: bool) {
        info!(
            event = "artifact_deleted",
            instance = %self.instance,
            path = %path.display(),
            trigger = %trigger,
            already_absent = already_absent,
            "Artifact removed"
        );
    }

    pub fn log_artifact_delete_failed(&self, path: &Path, trigger: &str, error: &str) {
        warn!(
            event = "artifact_delete_failed",
            instance = %self.instance,
            path = %path.display(),
            trigger = %trigger,
            error = %error,
            "Failed to remove artifact, leaving it for the sweeper"
        );
    }

    pub fn log_post_created(&self, id: u64, category: Category) {
        info!(
            event = "post_created",
            instance = %self.instance,
            post_id = id,
            category = %category,
            "Community post created"
        );
    }

    pub fn log_post_deleted(&self, id: u64, category: Category) {
        info!(
            event = "post_deleted",
            instance = %self.instance,
            post_id = id,
            category = %category,
            "Community post deleted"
        );
    }

    pub fn log_post_liked(&self, id: u64, category: Category, likes: u64) {
        info!(
            event = "post_liked",
            instance = %self.instance,
            post_id = id,
            category = %category,
            likes = likes,
            "Community post liked"
        );
    }

    pub fn log_startup(&self, version: &str, tabular_ready: bool, image_ready: bool) {
        if tabular_ready && image_ready {
            info!(
                event = "service_started",
                instance = %self.instance,
                version = %version,
                "StrokeWatch service started"
            );
        } else {
            warn!(
                event = "service_started",
                instance = %self.instance,
                version = %version,
                tabular_ready = tabular_ready,
                image_ready = image_ready,
                "StrokeWatch service started with unavailable model backends"
            );
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "StrokeWatch service shutting down"
        );
    }
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("strokewatch")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_metrics_handles_share_registry() {
        let metrics = ServiceMetrics::new();
        let other = metrics.clone();

        metrics.observe_prediction("tabular", 0.004);
        other.inc_prediction_errors("image", "inference");
        metrics.inc_artifacts_stored();
        metrics.set_artifact_stats(&ArtifactStats {
            tracked: 2,
            deleted: 5,
            already_absent: 1,
            failed: 0,
        });
        metrics.set_post_counts(&[(Category::FreeTalk, 3), (Category::Others, 0)]);
        other.inc_post_likes();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "strokewatch_predictions_total"));
        assert!(families.iter().any(|f| f.get_name() == "strokewatch_posts"));
    }

    /// `_total` is reserved for counters in the exposition format
    #[test]
    fn test_total_suffix_only_on_counters() {
        let metrics = ServiceMetrics::new();
        metrics.inc_artifacts_stored();
        metrics.inc_post_likes();
        metrics.set_artifact_stats(&ArtifactStats {
            tracked: 1,
            deleted: 3,
            already_absent: 0,
            failed: 1,
        });

        let families: Vec<_> = prometheus::gather()
            .into_iter()
            .filter(|f| f.get_name().starts_with("strokewatch_"))
            .collect();
        assert!(families.iter().any(|f| f.get_name() == "strokewatch_artifacts_deleted"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "strokewatch_artifact_delete_failures"));
        for family in &families {
            if family.get_name().ends_with("_total") {
                assert_eq!(
                    family.get_field_type(),
                    prometheus::proto::MetricType::COUNTER,
                    "{} is not a counter",
                    family.get_name()
                );
            }
        }
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("strokewatch-test");
        assert_eq!(logger.instance, "strokewatch-test");
        assert_eq!(StructuredLogger::default().instance, "strokewatch");
    }
}
