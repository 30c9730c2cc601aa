// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the bucket copy agent
//!
//! Exports metrics for monitoring bucket jobs including:
//! - Objects and bytes copied by the local pipeline
//! - Objects received from peers, and records dropped on receive
//! - Admissions and finished jobs by result
//! - Job duration

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

// Metric definitions are constant; a failure here is a programming error
// that should panic at startup.
#[allow(clippy::expect_used)]
mod metrics_impl {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        /// Registry for all agent metrics
        pub static ref REGISTRY: Registry = Registry::new();

        /// Objects copied by the local pipeline
        pub static ref OBJECTS_TOTAL: Counter = Counter::with_opts(
            Opts::new("bucket_copy_objects_total", "Objects copied by the local pipeline")
        ).expect("valid metric name");

        /// Bytes copied by the local pipeline
        pub static ref BYTES_TOTAL: Counter = Counter::with_opts(
            Opts::new("bucket_copy_bytes_total", "Bytes copied by the local pipeline")
        ).expect("valid metric name");

        /// Objects received from peers and persisted
        pub static ref RECEIVED_TOTAL: Counter = Counter::with_opts(
            Opts::new("bucket_copy_received_total", "Objects received from peers and persisted")
        ).expect("valid metric name");

        /// Received records dropped, by reason
        pub static ref DROPPED_TOTAL: CounterVec = CounterVec::new(
            Opts::new("bucket_copy_dropped_total", "Received records dropped by reason"),
            &["reason"]
        ).expect("valid metric name and labels");

        /// Admission requests by result (new, reused, rejected)
        pub static ref ADMISSIONS_TOTAL: CounterVec = CounterVec::new(
            Opts::new("bucket_copy_admissions_total", "Admission requests by result"),
            &["result"]
        ).expect("valid metric name and labels");

        /// Finished jobs by outcome (ok, error, aborted, timeout)
        pub static ref JOBS_TOTAL: CounterVec = CounterVec::new(
            Opts::new("bucket_copy_jobs_total", "Finished jobs by outcome"),
            &["outcome"]
        ).expect("valid metric name and labels");

        /// More completion markers received than peers expected
        pub static ref PROTOCOL_VIOLATIONS: Counter = Counter::with_opts(
            Opts::new(
                "bucket_copy_protocol_violations_total",
                "Completion markers received beyond the expected peer count"
            )
        ).expect("valid metric name");

        /// Job duration histogram
        pub static ref JOB_DURATION: Histogram = Histogram::with_opts(
            HistogramOpts::new(
                "bucket_copy_job_duration_seconds",
                "Job run time in seconds"
            )
            // Buckets: 1s, 5s, 10s, 30s, 1m, 5m, 10m, 30m, 1h, 3h
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 10800.0])
        ).expect("valid histogram opts");
    }
}

pub use metrics_impl::{
    ADMISSIONS_TOTAL, BYTES_TOTAL, DROPPED_TOTAL, JOB_DURATION, JOBS_TOTAL, OBJECTS_TOTAL,
    PROTOCOL_VIOLATIONS, RECEIVED_TOTAL, REGISTRY,
};

/// Register all metrics with the registry
///
/// Should be called once during application startup.
/// Panics if registration fails (indicates a programming error).
#[allow(clippy::expect_used)]
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(OBJECTS_TOTAL.clone()))
        .expect("Failed to register OBJECTS_TOTAL");
    REGISTRY
        .register(Box::new(BYTES_TOTAL.clone()))
        .expect("Failed to register BYTES_TOTAL");
    REGISTRY
        .register(Box::new(RECEIVED_TOTAL.clone()))
        .expect("Failed to register RECEIVED_TOTAL");
    REGISTRY
        .register(Box::new(DROPPED_TOTAL.clone()))
        .expect("Failed to register DROPPED_TOTAL");
    REGISTRY
        .register(Box::new(ADMISSIONS_TOTAL.clone()))
        .expect("Failed to register ADMISSIONS_TOTAL");
    REGISTRY
        .register(Box::new(JOBS_TOTAL.clone()))
        .expect("Failed to register JOBS_TOTAL");
    REGISTRY
        .register(Box::new(PROTOCOL_VIOLATIONS.clone()))
        .expect("Failed to register PROTOCOL_VIOLATIONS");
    REGISTRY
        .register(Box::new(JOB_DURATION.clone()))
        .expect("Failed to register JOB_DURATION");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Record an object copied by the local pipeline
pub fn record_object_copied(bytes: u64) {
    OBJECTS_TOTAL.inc();
    BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record an object received from a peer and persisted
pub fn record_object_received() {
    RECEIVED_TOTAL.inc();
}

/// Record a dropped inbound record
pub fn record_dropped(reason: &str) {
    DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Record an admission result
pub fn record_admission(result: &str) {
    ADMISSIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a finished job
pub fn record_job_finished(outcome: &str, duration_secs: f64) {
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
    JOB_DURATION.observe(duration_secs);
}

/// Record a completion marker beyond the expected count
pub fn record_protocol_violation() {
    PROTOCOL_VIOLATIONS.inc();
}
