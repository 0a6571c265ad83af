// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for patient-integrity.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The binary
//! installs a Prometheus exporter; library users pick their own.
//!
//! # Metric Naming Convention
//! - `patient_integrity_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: rpc, memory, redis
//! - `operation`: upsert, fetch, get, put
//! - `status`: success, error, not_found, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// LEDGER
// ═══════════════════════════════════════════════════════════════════════════

/// Record a ledger call outcome
pub fn record_ledger_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "patient_integrity_ledger_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record ledger call latency (upsert latency includes confirmation wait)
pub fn record_ledger_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "patient_integrity_ledger_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a write that stayed unconfirmed past the timeout
pub fn record_confirmation_timeout() {
    counter!("patient_integrity_confirmation_timeouts_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// VERIFICATION
// ═══════════════════════════════════════════════════════════════════════════

/// Record a verification outcome (verified, mismatched, indeterminate)
pub fn record_verification(outcome: &str) {
    counter!(
        "patient_integrity_verifications_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one section that failed verification
pub fn record_section_mismatch(section: &str) {
    counter!(
        "patient_integrity_section_mismatches_total",
        "section" => section.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DOCUMENT STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a document store call outcome
pub fn record_document_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "patient_integrity_document_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// RESILIENCE / HEALTH
// ═══════════════════════════════════════════════════════════════════════════

/// Record circuit breaker call outcome
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "patient_integrity_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "patient_integrity_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Count service state transitions
pub fn set_service_state(state: &str) {
    counter!(
        "patient_integrity_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════════

/// Record an HTTP request by route and status code
pub fn record_http_request(route: &str, status: u16) {
    counter!(
        "patient_integrity_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// A timing guard that records ledger latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_ledger_latency(self.backend, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only check the calls don't panic without an installed recorder.

    #[test]
    fn test_ledger_metrics() {
        record_ledger_operation("rpc", "upsert", "success");
        record_ledger_operation("memory", "fetch", "not_found");
        record_ledger_latency("rpc", "fetch", Duration::from_millis(12));
        record_confirmation_timeout();
    }

    #[test]
    fn test_verification_metrics() {
        record_verification("verified");
        record_verification("indeterminate");
        record_section_mismatch("motorFunction");
    }

    #[test]
    fn test_backend_and_http_metrics() {
        record_document_operation("redis", "put", "success");
        record_circuit_breaker_call("ledger_rpc", "rejected");
        set_backend_healthy("ledger", false);
        set_service_state("Ready");
        record_http_request("/patient-data", 200);
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("memory", "fetch");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
