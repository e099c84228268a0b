use crate::collector::MetricCollector;
use crate::scenario::{Scenario, VuContext};
use crate::step::{self, WorkerHook, WORKER_HOOK};
use rampart_core::{MetricSample, ITERATIONS, ITERATION_DURATION};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

/// A spawned virtual user.
pub(crate) struct Worker {
    pub id: u64,
    stop: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    pub handle: JoinHandle<()>,
}

impl Worker {
    pub fn spawn<S: Scenario>(id: u64, scenario: Arc<S>, collector: Arc<MetricCollector>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let hook = WorkerHook {
            collector,
            in_flight: in_flight.clone(),
        };

        let span = tracing::debug_span!("worker", vu = id);
        let handle = tokio::spawn(
            WORKER_HOOK
                .scope(hook, worker_loop(id, scenario, stop.clone()))
                .instrument(span),
        );

        Self {
            id,
            stop,
            in_flight,
            handle,
        }
    }

    /// Asks the worker to exit once its current iteration is done.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

async fn worker_loop<S: Scenario>(id: u64, scenario: Arc<S>, stop: Arc<AtomicBool>) {
    trace!("Starting virtual user {id}");
    let mut user = scenario.new_user(VuContext::new(id));

    while !stop.load(Ordering::Acquire) {
        let start = Instant::now();
        scenario.iteration(&mut user).await;
        step::record(MetricSample::counter(ITERATIONS, 1.));
        step::record(MetricSample::duration(ITERATION_DURATION, start.elapsed()));
    }

    trace!("Virtual user {id} retired");
}
