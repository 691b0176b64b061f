//! Metrics sink for instrumented calls.
//!
//! Instrumented calls never talk to a metrics backend directly. Instead, they emit through [`MetricsSink`], a narrow
//! interface accepting counter increments, gauge readings, and timer recordings, each keyed by an already-encoded
//! metric name. [`RecorderSink`] forwards these to the [`metrics`][metrics] facade, so whichever recorder is installed
//! (globally, or thread-locally via `metrics::with_local_recorder`) ends up storing and exporting them.
//!
//! [metrics]: https://docs.rs/metrics
#![deny(missing_docs)]

use std::time::Duration;

use metrics::{counter, gauge, histogram};

#[cfg(any(test, feature = "test"))]
pub mod test;

/// A generic, opaque error.
pub type GenericError = anyhow::Error;

/// A destination for call metrics.
///
/// Implementations must be safe to call concurrently from many threads, as every instrumented call site shares the same
/// sink. Any aggregation by metric name (counters summed, gauges overwritten, timer samples collected) is the
/// responsibility of the implementation.
///
/// Errors returned from these methods are treated as instrumentation failures: they are logged by the caller and never
/// affect the outcome of the instrumented call.
pub trait MetricsSink: Send + Sync {
    /// Increments the counter with the given name by one.
    fn increment_counter(&self, name: &str) -> Result<(), GenericError>;

    /// Sets the gauge with the given name to `value`, in milliseconds.
    ///
    /// The gauge must remain addressable after this call returns, even though its value is fixed at this point, so that
    /// it can be sampled later on.
    fn record_gauge(&self, name: &str, value: f64) -> Result<(), GenericError>;

    /// Records a single elapsed time sample in the timer with the given name.
    fn record_timer(&self, name: &str, elapsed: Duration) -> Result<(), GenericError>;
}

impl<S> MetricsSink for std::sync::Arc<S>
where
    S: MetricsSink + ?Sized,
{
    fn increment_counter(&self, name: &str) -> Result<(), GenericError> {
        (**self).increment_counter(name)
    }

    fn record_gauge(&self, name: &str, value: f64) -> Result<(), GenericError> {
        (**self).record_gauge(name, value)
    }

    fn record_timer(&self, name: &str, elapsed: Duration) -> Result<(), GenericError> {
        (**self).record_timer(name, elapsed)
    }
}

/// A sink that forwards to the `metrics` facade.
///
/// Counters map to `metrics` counters, gauges to gauges, and timers to histograms. Timer samples are recorded in
/// milliseconds, matching gauge readings.
///
/// Handles are registered on every emission rather than cached: the installed recorder owns the underlying storage, which
/// keeps one-shot gauge readings alive until they are sampled.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn increment_counter(&self, name: &str) -> Result<(), GenericError> {
        counter!(name.to_string()).increment(1);
        Ok(())
    }

    fn record_gauge(&self, name: &str, value: f64) -> Result<(), GenericError> {
        gauge!(name.to_string()).set(value);
        Ok(())
    }

    fn record_timer(&self, name: &str, elapsed: Duration) -> Result<(), GenericError> {
        histogram!(name.to_string()).record(duration_as_millis(elapsed));
        Ok(())
    }
}

/// Converts a duration to fractional milliseconds.
pub fn duration_as_millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestRecorder;

    #[test]
    fn recorder_sink_forwards_to_local_recorder() {
        let recorder = TestRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            let sink = RecorderSink;
            sink.increment_counter("calls!method.name=foo").unwrap();
            sink.increment_counter("calls!method.name=foo").unwrap();
            sink.record_gauge("latency!method.name=foo", 12.0).unwrap();
            sink.record_timer("timer!method.name=foo", Duration::from_millis(12)).unwrap();
        });

        assert_eq!(recorder.counter("calls!method.name=foo"), Some(2));
        assert_eq!(recorder.gauge("latency!method.name=foo"), Some(12.0));
        assert_eq!(recorder.histogram("timer!method.name=foo"), Some(vec![12.0]));
        assert_eq!(recorder.counter("calls!method.name=bar"), None);
    }

    #[test]
    fn gauge_reading_survives_after_emission() {
        let recorder = TestRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            RecorderSink.record_gauge("latency", 3.5).unwrap();
        });

        // Nothing holds the handle anymore, but the recorder still has the reading.
        assert_eq!(recorder.gauge("latency"), Some(3.5));
    }

    #[test]
    fn sub_millisecond_durations_are_fractional() {
        assert_eq!(duration_as_millis(Duration::from_micros(1500)), 1.5);
        assert_eq!(duration_as_millis(Duration::ZERO), 0.0);
    }
}
