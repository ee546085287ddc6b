//! # Worker Metrics
//!
//! Every polling worker reports the duration of each cycle through a
//! [`MetricsSink`]. The default sink records into OpenTelemetry instruments
//! obtained from the global meter provider; wiring an exporter is up to the
//! host process.
//!
//! ```rust
//! use ob_task_engine::metrics::{MetricsSink, OpenTelemetryMetricsSink};
//! use std::time::Duration;
//!
//! let sink = OpenTelemetryMetricsSink::new();
//! sink.record_duration("ready_task_worker", Duration::from_millis(12));
//! ```

use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;
use std::time::Duration;

/// Lazy-initialized meter for engine metrics
static ENGINE_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    ENGINE_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("ob-task-engine"))
}

/// Worker cycle duration in milliseconds
///
/// Labels:
/// - worker: name of the polling worker
pub fn worker_cycle_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("ob_task_engine.worker.cycle.duration")
        .with_description("Polling worker cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Destination for named duration samples
pub trait MetricsSink: Send + Sync {
    fn record_duration(&self, name: &str, duration: Duration);
}

#[derive(Clone)]
pub struct OpenTelemetryMetricsSink {
    cycle_duration: Histogram<f64>,
}

impl OpenTelemetryMetricsSink {
    pub fn new() -> Self {
        Self {
            cycle_duration: worker_cycle_duration(),
        }
    }
}

impl Default for OpenTelemetryMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for OpenTelemetryMetricsSink {
    fn record_duration(&self, name: &str, duration: Duration) {
        self.cycle_duration.record(
            duration.as_secs_f64() * 1000.0,
            &[KeyValue::new("worker", name.to_string())],
        );
    }
}
