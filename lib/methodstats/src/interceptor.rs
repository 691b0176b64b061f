//! Call interception.
//!
//! An intercepted call goes through the following states, once per invocation:
//!
//! ```text
//! START -> PROCEED -> (SUCCESS | ERROR) -> EMITTED
//! ```
//!
//! The start time is taken before the call proceeds. Once the call terminates, it is classified as a success or an
//! error and its metrics are emitted:
//!
//! - on success, the latency (as a gauge reading and a timer sample, both untagged by outcome) and the invocation count
//!   tagged `SUCCESS`
//! - on error, only the invocation count tagged `ERROR`
//!
//! The value returned by the call, or the panic it raised, is handed back to the caller untouched. Failures within the
//! instrumentation itself are logged and otherwise swallowed, and can't change what the caller observes.

use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use methodstats_metrics::{duration_as_millis, GenericError, MetricsSink, RecorderSink};
use pin_project::pin_project;
use tracing::error;

use crate::{
    call_site::{CallSite, CapturedArguments},
    name::{MetricIdentity, MetricKind},
    resolver::{resolve_tags, Outcome},
};

static GLOBAL_INTERCEPTOR: OnceLock<Interceptor> = OnceLock::new();

/// Classifies the output of a call as a success or an error.
pub trait Classify<T> {
    /// Returns the outcome of a call that produced `output`.
    fn classify(output: &T) -> Outcome;
}

/// Classifies `Err` as an error, and `Ok` as a success.
#[derive(Debug)]
pub enum Fallible {}

impl<T, E> Classify<Result<T, E>> for Fallible {
    fn classify(output: &Result<T, E>) -> Outcome {
        match output {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Error,
        }
    }
}

/// Classifies every returned value as a success.
///
/// Calls classified this way can only fail by panicking.
#[derive(Debug)]
pub enum Infallible {}

impl<T> Classify<T> for Infallible {
    fn classify(_: &T) -> Outcome {
        Outcome::Success
    }
}

/// Wraps calls to capture their metrics.
///
/// An interceptor holds no per-call state, and can be shared freely between threads: every invocation keeps its start
/// time, captured arguments, and outcome to itself. The only shared resource is the sink.
#[derive(Clone)]
pub struct Interceptor {
    sink: Arc<dyn MetricsSink>,
}

impl Interceptor {
    /// Creates a new `Interceptor` emitting to the given sink.
    pub fn new<S>(sink: S) -> Self
    where
        S: MetricsSink + 'static,
    {
        Self { sink: Arc::new(sink) }
    }

    /// Creates a new `Interceptor` emitting to a shared sink.
    pub fn from_shared(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Returns the global interceptor.
    ///
    /// The global interceptor emits to the `metrics` facade through [`RecorderSink`], and is what call sites instrumented
    /// with `#[method_stats]` use.
    pub fn global() -> &'static Self {
        GLOBAL_INTERCEPTOR.get_or_init(|| Self::new(RecorderSink))
    }

    /// Calls `f`, capturing its metrics.
    ///
    /// Returning `Err` is classified as an error. The result is returned as-is.
    pub fn call<T, E, F>(&self, site: &CallSite, captured: CapturedArguments, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.intercept::<Fallible, _, _>(site, captured, f)
    }

    /// Calls `f`, capturing its metrics.
    ///
    /// Any returned value is classified as a success, so `f` can only fail by panicking.
    pub fn call_infallible<T, F>(&self, site: &CallSite, captured: CapturedArguments, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.intercept::<Infallible, _, _>(site, captured, f)
    }

    /// Calls `f`, capturing its metrics, with its output classified by `K`.
    ///
    /// If `f` panics, the invocation is counted as an error and the panic continues to unwind.
    pub fn intercept<K, T, F>(&self, site: &CallSite, captured: CapturedArguments, f: F) -> T
    where
        K: Classify<T>,
        F: FnOnce() -> T,
    {
        let invocation = Invocation::start(self, site, captured);
        let output = f();
        invocation.complete(K::classify(&output));
        output
    }

    /// Wraps `future`, capturing its metrics once it completes.
    ///
    /// Completing with `Err` is classified as an error.
    pub fn instrument_future<'a, F, T, E>(
        &'a self, site: &'a CallSite, captured: CapturedArguments, future: F,
    ) -> Instrumented<'a, F, Fallible>
    where
        F: Future<Output = Result<T, E>>,
    {
        Instrumented::new(self, site, captured, future)
    }

    /// Wraps `future`, capturing its metrics once it completes.
    ///
    /// Any output is classified as a success, so `future` can only fail by panicking.
    pub fn instrument_future_infallible<'a, F>(
        &'a self, site: &'a CallSite, captured: CapturedArguments, future: F,
    ) -> Instrumented<'a, F, Infallible>
    where
        F: Future,
    {
        Instrumented::new(self, site, captured, future)
    }

    fn emit(&self, site: &CallSite, captured: &CapturedArguments, outcome: Outcome, elapsed: Duration) {
        let config = site.config();

        // Latency is only meaningful for calls that ran to completion.
        if outcome == Outcome::Success && config.capture_latency() {
            self.guarded(site, "latency", || self.record_latency(site, captured, elapsed));
        }

        if config.capture_count() {
            self.guarded(site, "count", || self.increment_count(site, captured, outcome));
        }
    }

    fn record_latency(
        &self, site: &CallSite, captured: &CapturedArguments, elapsed: Duration,
    ) -> Result<(), GenericError> {
        let tags = resolve_tags(site, captured, None);
        let gauge_name = MetricIdentity::new(MetricKind::Gauge, tags.clone()).encode();
        let timer_name = MetricIdentity::new(MetricKind::Timer, tags).encode();

        self.sink.record_gauge(&gauge_name, duration_as_millis(elapsed))?;
        self.sink.record_timer(&timer_name, elapsed)
    }

    fn increment_count(
        &self, site: &CallSite, captured: &CapturedArguments, outcome: Outcome,
    ) -> Result<(), GenericError> {
        let tags = resolve_tags(site, captured, Some(outcome));
        let counter_name = MetricIdentity::new(MetricKind::Count, tags).encode();

        self.sink.increment_counter(&counter_name)
    }

    fn guarded<F>(&self, site: &CallSite, metric_path: &'static str, f: F)
    where
        F: FnOnce() -> Result<(), GenericError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(call_site = %site.signature(), metric_path, error = %e, "Error while capturing metrics.");
            }
            Err(_) => {
                error!(call_site = %site.signature(), metric_path, "Panicked while capturing metrics.");
            }
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor").finish_non_exhaustive()
    }
}

/// A single synchronous invocation.
///
/// If it is dropped without being completed while the thread is panicking, the wrapped call panicked: the invocation is
/// counted as an error on the way out.
struct Invocation<'a> {
    interceptor: &'a Interceptor,
    site: &'a CallSite,
    captured: CapturedArguments,
    start: Instant,
    completed: bool,
}

impl<'a> Invocation<'a> {
    fn start(interceptor: &'a Interceptor, site: &'a CallSite, captured: CapturedArguments) -> Self {
        Self {
            interceptor,
            site,
            captured,
            start: Instant::now(),
            completed: false,
        }
    }

    fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.interceptor
            .emit(self.site, &self.captured, outcome, self.start.elapsed());
    }
}

impl Drop for Invocation<'_> {
    fn drop(&mut self) {
        if !self.completed && std::thread::panicking() {
            self.completed = true;
            self.interceptor
                .emit(self.site, &self.captured, Outcome::Error, self.start.elapsed());
        }
    }
}

/// An instrumented future.
///
/// Timing starts at the first poll. Metrics are emitted once, when the future completes or panics while being polled; a
/// future that is dropped before completing emits nothing.
#[pin_project]
#[must_use = "futures do nothing unless polled"]
pub struct Instrumented<'a, F, K> {
    interceptor: &'a Interceptor,
    site: &'a CallSite,
    captured: CapturedArguments,
    start: Option<Instant>,
    completed: bool,
    #[pin]
    inner: F,
    _classify: PhantomData<fn() -> K>,
}

impl<'a, F, K> Instrumented<'a, F, K> {
    fn new(interceptor: &'a Interceptor, site: &'a CallSite, captured: CapturedArguments, inner: F) -> Self {
        Self {
            interceptor,
            site,
            captured,
            start: None,
            completed: false,
            inner,
            _classify: PhantomData,
        }
    }
}

impl<F, K> Future for Instrumented<'_, F, K>
where
    F: Future,
    K: Classify<F::Output>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let start = *this.start.get_or_insert_with(Instant::now);
        let inner = this.inner;

        match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => {
                if !*this.completed {
                    *this.completed = true;
                    this.interceptor
                        .emit(this.site, this.captured, K::classify(&output), start.elapsed());
                }
                Poll::Ready(output)
            }
            Err(payload) => {
                if !*this.completed {
                    *this.completed = true;
                    this.interceptor
                        .emit(this.site, this.captured, Outcome::Error, start.elapsed());
                }
                panic::resume_unwind(payload)
            }
        }
    }
}
