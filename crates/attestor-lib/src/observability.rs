//! Observability infrastructure for the attestor
//!
//! Provides:
//! - Prometheus metrics (attestation latency, outcomes, pod listing size)
//! - Structured JSON logging with tracing

use crate::error::{AttestationError, Severity};
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Attestation latency buckets (in seconds), up to the default deadline
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Outcome label for a successful attestation
pub const OUTCOME_SUCCESS: &str = "success";

static GLOBAL_METRICS: OnceLock<AttestorMetricsInner> = OnceLock::new();

struct AttestorMetricsInner {
    attestation_latency_seconds: Histogram,
    attestations_total: IntCounterVec,
    directory_pods_listed: IntGauge,
}

impl AttestorMetricsInner {
    fn new() -> Self {
        Self {
            attestation_latency_seconds: register_histogram!(
                "workload_attestor_attestation_latency_seconds",
                "Time spent attesting a workload from peer handle to selectors",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register attestation_latency_seconds"),

            attestations_total: register_int_counter_vec!(
                "workload_attestor_attestations_total",
                "Attestation attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register attestations_total"),

            directory_pods_listed: register_int_gauge!(
                "workload_attestor_directory_pods_listed",
                "Number of pods returned by the most recent kubelet listing"
            )
            .expect("Failed to register directory_pods_listed"),
        }
    }
}

/// Handle to the process-wide attestor metrics; clones share one registry entry
#[derive(Clone)]
pub struct AttestorMetrics {
    _private: (),
}

impl Default for AttestorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AttestorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AttestorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AttestorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record one finished attestation
    pub fn observe_attestation(&self, duration_secs: f64, outcome: &str) {
        self.inner().attestation_latency_seconds.observe(duration_secs);
        self.inner()
            .attestations_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn set_pods_listed(&self, count: i64) {
        self.inner().directory_pods_listed.set(count);
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }

    #[cfg(test)]
    fn attestations(&self, outcome: &str) -> u64 {
        self.inner()
            .attestations_total
            .with_label_values(&[outcome])
            .get()
    }
}

/// Event-named logging for attestation decisions
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_attestation_succeeded(
        &self,
        pid: u32,
        container_id: &str,
        spiffe_id: &str,
        selector_count: usize,
    ) {
        info!(
            event = "attestation_succeeded",
            node = %self.node_name,
            pid = pid,
            container_id = %container_id,
            spiffe_id = %spiffe_id,
            selector_count = selector_count,
            "Workload attested"
        );
    }

    /// Log a failed attestation at the level its severity calls for
    pub fn log_attestation_failed(&self, err: &AttestationError) {
        let kind = err.kind().as_str();
        match err.severity() {
            Severity::Expected => debug!(
                event = "attestation_failed",
                node = %self.node_name,
                kind = kind,
                error = %err,
                "Caller is not a managed workload"
            ),
            Severity::Rejected => warn!(
                event = "attestation_failed",
                node = %self.node_name,
                kind = kind,
                error = %err,
                "Attestation rejected"
            ),
            Severity::Infrastructure => error!(
                event = "attestation_failed",
                node = %self.node_name,
                kind = kind,
                error = %err,
                "Attestation infrastructure failure"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, socket_path: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            socket_path = %socket_path,
            "Workload attestor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Workload attestor shutting down"
        );
    }
}
