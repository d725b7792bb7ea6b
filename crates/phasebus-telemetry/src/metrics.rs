//! Pipeline metrics.
//!
//! Metrics are recorded through the `metrics` facade. This crate does not
//! install an exporter; without a recorder every call is a no-op, so the
//! pipeline records unconditionally.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `phasebus_chain_runs_total` | Counter | `direction`, `outcome` |
//! | `phasebus_chain_duration_seconds` | Histogram | `direction` |
//! | `phasebus_faults_total` | Counter | `category` |
//! | `phasebus_chain_resolutions_total` | Counter | `flow` |

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Chain run counter.
pub const CHAIN_RUNS_TOTAL: &str = "phasebus_chain_runs_total";
/// Chain run duration histogram.
pub const CHAIN_DURATION_SECONDS: &str = "phasebus_chain_duration_seconds";
/// Fault counter.
pub const FAULTS_TOTAL: &str = "phasebus_faults_total";
/// Chain resolution counter.
pub const CHAIN_RESOLUTIONS_TOTAL: &str = "phasebus_chain_resolutions_total";

/// Registers descriptions for every phasebus metric with the installed
/// recorder.
pub fn describe_metrics() {
    describe_counter!(
        CHAIN_RUNS_TOTAL,
        "Interceptor chain runs by message direction and outcome"
    );
    describe_histogram!(
        CHAIN_DURATION_SECONDS,
        "Time spent driving an interceptor chain, per run"
    );
    describe_counter!(FAULTS_TOTAL, "Faults handed to the fault chain by category");
    describe_counter!(
        CHAIN_RESOLUTIONS_TOTAL,
        "Interceptor chains resolved (cache misses) by flow"
    );
}

/// Records one chain run.
///
/// `outcome` is the chain state the run ended in ("complete", "suspended",
/// "aborted").
pub fn record_chain_run(direction: &'static str, outcome: &'static str, duration: Duration) {
    counter!(CHAIN_RUNS_TOTAL, "direction" => direction, "outcome" => outcome).increment(1);
    histogram!(CHAIN_DURATION_SECONDS, "direction" => direction).record(duration.as_secs_f64());
}

/// Records a fault entering the fault chain.
pub fn record_fault(category: &'static str) {
    counter!(FAULTS_TOTAL, "category" => category).increment(1);
}

/// Records a chain resolution.
pub fn record_chain_resolution(flow: &'static str) {
    counter!(CHAIN_RESOLUTIONS_TOTAL, "flow" => flow).increment(1);
}
