//! Metric names and the instruments recorded by the relay and the engine
//!
//! Instruments are created from the global meter provider, so they are
//! no-ops until [`crate::init`] installs an OTLP exporter.

use std::time::Instant;

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

pub const RELAY_REQUEST_COUNT: &str = "relay.request.count";
pub const RELAY_REQUEST_DURATION: &str = "relay.request.duration";
pub const DISPATCH_SETTLE_COUNT: &str = "dispatch.settle.count";
pub const DISPATCH_TIME_TO_FIRST_DELTA: &str = "dispatch.time_to_first_delta";

const METER_NAME: &str = "chorus";

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}

/// Instruments for relayed vendor calls
#[derive(Clone)]
pub struct RelayMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);

        Self {
            requests: meter
                .u64_counter(RELAY_REQUEST_COUNT)
                .with_description("Relayed completion requests")
                .build(),
            duration: meter
                .f64_histogram(RELAY_REQUEST_DURATION)
                .with_unit("s")
                .with_description("Time until the vendor response headers arrived")
                .build(),
        }
    }

    /// Count one relayed request and how long the vendor took to answer
    pub fn record(&self, provider: &str, outcome: &'static str, start: Instant) {
        let attributes = [
            KeyValue::new("provider", provider.to_owned()),
            KeyValue::new("outcome", outcome),
        ];

        self.requests.add(1, &attributes);
        record_duration(&self.duration, start, &attributes);
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Instruments for fan-out dispatches
#[derive(Clone)]
pub struct DispatchMetrics {
    settled: Counter<u64>,
    first_delta: Histogram<f64>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);

        Self {
            settled: meter
                .u64_counter(DISPATCH_SETTLE_COUNT)
                .with_description("Target turns that reached a settled state")
                .build(),
            first_delta: meter
                .f64_histogram(DISPATCH_TIME_TO_FIRST_DELTA)
                .with_unit("s")
                .with_description("Time from dispatch until a target's first delta")
                .build(),
        }
    }

    pub fn record_settled(&self, provider: &str, outcome: &'static str) {
        self.settled.add(
            1,
            &[
                KeyValue::new("provider", provider.to_owned()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }

    pub fn record_first_delta(&self, provider: &str, start: Instant) {
        record_duration(
            &self.first_delta,
            start,
            &[KeyValue::new("provider", provider.to_owned())],
        );
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
