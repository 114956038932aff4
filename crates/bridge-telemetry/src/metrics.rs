//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Histogram;

/// Record the time elapsed since `start` in seconds
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}

/// Instrumentation scope for every bridge meter
pub const METER_NAME: &str = "claude-bridge";

pub const CLI_INVOCATION_COUNT: &str = "cli.invocation.count";
pub const CLI_INVOCATION_DURATION: &str = "cli.invocation.duration";
pub const CLI_TIME_TO_FIRST_FRAGMENT: &str = "cli.time_to_first_fragment";
pub const CLI_TOKEN_USAGE: &str = "cli.token.usage";
