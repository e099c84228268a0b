//! Instrumentation used inside scenarios.
//!
//! Workers run their scenario inside a task-local [`WorkerHook`] scope, so a step
//! only has to wrap its request in [`request`] (or call [`check`], or a metric
//! handle) and the observation lands in the collector of the run it belongs to.
use crate::collector::MetricCollector;
use rampart_core::{
    MetricSample, CHECKS, CHECK_TAG, ENDPOINT_TAG, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
};
use std::future::Future;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
pub(crate) struct WorkerHook {
    pub collector: Arc<MetricCollector>,
    /// Requests this worker currently has outstanding.
    pub in_flight: Arc<AtomicUsize>,
}

tokio::task_local! {
    pub(crate) static WORKER_HOOK: WorkerHook;
}

/// Runs `fut` with `collector` as the destination of every step it performs.
///
/// Workers do this automatically; it is useful for driving a single iteration
/// by hand, e.g. in tests.
pub async fn instrument<F: Future>(collector: Arc<MetricCollector>, fut: F) -> F::Output {
    let hook = WorkerHook {
        collector,
        in_flight: Arc::new(AtomicUsize::new(0)),
    };
    WORKER_HOOK.scope(hook, fut).await
}

/// Output of a timed request.
#[derive(Debug)]
pub struct Timed<T> {
    pub output: T,
    pub elapsed: Duration,
}

/// Times `func`, records its duration into `http_req_duration{endpoint}` and its
/// outcome into `http_req_failed{endpoint}`.
///
/// An `Err` counts as a failed request. The request is counted as in flight until
/// it completes.
pub async fn request<T, R, E>(endpoint: &'static str, func: T) -> Timed<Result<R, E>>
where
    T: Future<Output = Result<R, E>>,
{
    let hook = WORKER_HOOK.try_with(|hook| hook.clone()).ok();
    if hook.is_none() {
        tracing::warn!("No worker hook available, {endpoint} will not be recorded.");
    }

    if let Some(hook) = &hook {
        hook.in_flight.fetch_add(1, Ordering::AcqRel);
    }
    let start = Instant::now();
    let output = func.await;
    let elapsed = start.elapsed();

    if let Some(hook) = hook {
        hook.in_flight.fetch_sub(1, Ordering::AcqRel);
        hook.collector.record(
            MetricSample::duration(HTTP_REQ_DURATION, elapsed).with_tag(ENDPOINT_TAG, endpoint),
        );
        hook.collector.record(
            MetricSample::rate(HTTP_REQ_FAILED, output.is_err()).with_tag(ENDPOINT_TAG, endpoint),
        );
    }

    Timed { output, elapsed }
}

/// Records a named assertion into the `checks` rate and hands `passed` back.
pub fn check(name: &'static str, passed: bool) -> bool {
    record(MetricSample::rate(CHECKS, passed).with_tag(CHECK_TAG, name));
    passed
}

/// Records a sample into the current worker's collector.
pub fn record(sample: MetricSample) {
    if WORKER_HOOK
        .try_with(|hook| hook.collector.record(sample))
        .is_err()
    {
        tracing::trace!("No worker hook available, dropping sample.");
    }
}

/// A named counter, e.g. `const MESSAGES: Counter = Counter::new("messages_received");`
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    name: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, value: f64) {
        record(MetricSample::counter(self.name, value));
    }
}

/// A named trend of millisecond values.
#[derive(Debug, Clone, Copy)]
pub struct Trend {
    name: &'static str,
}

impl Trend {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, value: f64) {
        record(MetricSample::trend(self.name, value));
    }

    pub fn add_duration(&self, elapsed: Duration) {
        record(MetricSample::duration(self.name, elapsed));
    }
}

/// A named rate.
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    name: &'static str,
}

impl Rate {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, observed: bool) {
        record(MetricSample::rate(self.name, observed));
    }
}
