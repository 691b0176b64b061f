//! Testing-related helpers.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Arc, Mutex,
    },
};

use metrics::{
    Counter, CounterFn, Gauge, GaugeFn, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};

struct CounterStorage {
    total: AtomicU64,
}

impl CounterFn for CounterStorage {
    fn increment(&self, value: u64) {
        self.total.fetch_add(value, SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.total.store(value, SeqCst);
    }
}

struct GaugeStorage {
    current: AtomicU64,
}

impl GaugeStorage {
    fn update(&self, f: impl Fn(f64) -> f64) {
        let _ = self
            .current
            .fetch_update(SeqCst, SeqCst, |v| Some(f(f64::from_bits(v)).to_bits()));
    }
}

impl GaugeFn for GaugeStorage {
    fn increment(&self, value: f64) {
        self.update(|current| current + value);
    }

    fn decrement(&self, value: f64) {
        self.update(|current| current - value);
    }

    fn set(&self, value: f64) {
        self.current.store(value.to_bits(), SeqCst);
    }
}

struct HistogramStorage {
    samples: Mutex<Vec<f64>>,
}

impl HistogramFn for HistogramStorage {
    fn record(&self, value: f64) {
        let mut samples = self.samples.lock().unwrap();
        samples.push(value);
    }
}

#[derive(Default)]
struct RecorderState {
    counters: HashMap<Key, Arc<CounterStorage>>,
    gauges: HashMap<Key, Arc<GaugeStorage>>,
    histograms: HashMap<Key, Arc<HistogramStorage>>,
}

/// A recorder implementation that stores metrics in memory for testing purposes.
///
/// Metrics are looked up by their full name, which for instrumented calls is the encoded name including tags. Storage is
/// never released, so every metric ever registered stays queryable.
#[derive(Clone, Default)]
pub struct TestRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl TestRecorder {
    /// Returns the current value of the counter with the given name, or `None` if no such counter exists.
    pub fn counter(&self, name: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        let counter = state.counters.get(&key_for(name))?;
        Some(counter.total.load(SeqCst))
    }

    /// Returns the current value of the gauge with the given name, or `None` if no such gauge exists.
    pub fn gauge(&self, name: &str) -> Option<f64> {
        let state = self.state.lock().unwrap();
        let gauge = state.gauges.get(&key_for(name))?;
        Some(f64::from_bits(gauge.current.load(SeqCst)))
    }

    /// Returns the samples of the histogram with the given name, or `None` if no such histogram exists.
    pub fn histogram(&self, name: &str) -> Option<Vec<f64>> {
        let state = self.state.lock().unwrap();
        let histogram = state.histograms.get(&key_for(name))?;
        let samples = histogram.samples.lock().unwrap();
        Some(samples.clone())
    }

    /// Returns the names of all registered counters, sorted.
    pub fn counter_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        sorted_names(state.counters.keys())
    }

    /// Returns the names of all registered gauges, sorted.
    pub fn gauge_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        sorted_names(state.gauges.keys())
    }

    /// Returns the names of all registered histograms, sorted.
    pub fn histogram_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        sorted_names(state.histograms.keys())
    }
}

fn key_for(name: &str) -> Key {
    Key::from_name(name.to_string())
}

fn sorted_names<'a>(keys: impl Iterator<Item = &'a Key>) -> Vec<String> {
    let mut names = keys.map(|key| key.name().to_string()).collect::<Vec<_>>();
    names.sort();
    names
}

impl Recorder for TestRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let mut state = self.state.lock().unwrap();
        let counter = state.counters.entry(key.clone()).or_insert_with(|| {
            Arc::new(CounterStorage {
                total: AtomicU64::new(0),
            })
        });

        Counter::from_arc(Arc::clone(counter))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        let mut state = self.state.lock().unwrap();
        let gauge = state.gauges.entry(key.clone()).or_insert_with(|| {
            Arc::new(GaugeStorage {
                current: AtomicU64::new(0.0f64.to_bits()),
            })
        });

        Gauge::from_arc(Arc::clone(gauge))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        let mut state = self.state.lock().unwrap();
        let histogram = state.histograms.entry(key.clone()).or_insert_with(|| {
            Arc::new(HistogramStorage {
                samples: Mutex::new(Vec::new()),
            })
        });

        Histogram::from_arc(Arc::clone(histogram))
    }
}
