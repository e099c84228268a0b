//! The ramp control loop.
//!
//! [`RampScheduler`] ticks on a fixed interval anchored to the run start. Each
//! tick it computes the target concurrency from the [`RunSchedule`] and spawns
//! or retires virtual users to match it. Retirement is cooperative: a retired
//! worker finishes its current iteration before exiting. When the last stage has
//! elapsed every worker is asked to stop, and only those still running after the
//! graceful-stop window are aborted.
use crate::collector::MetricCollector;
use crate::scenario::Scenario;
use rampart_core::{MetricKey, MetricKind, MetricSample, RunSchedule, ScheduleError, ABANDONED_REQUESTS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

mod ramp;
mod timer;
mod worker;

pub use ramp::{stage_at, target_at};
use timer::Timer;
use worker::Worker;

/// State of the control loop after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub elapsed: Duration,
    /// Index of the stage covering `elapsed`.
    pub stage: usize,
    pub target: usize,
    pub active: usize,
    /// Retired workers still finishing their last iteration.
    pub draining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampOutcome {
    /// Time from the first tick to the end of the last stage, or to the stop request.
    pub elapsed: Duration,
    /// Time spent waiting for workers after the ramp ended.
    pub drain: Duration,
    pub peak_active: usize,
    pub spawned: u64,
    pub abandoned_requests: u64,
    pub aborted: bool,
}

/// Requests an early stop of a run.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a [`StopHandle`].
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested. Never resolves if every handle is
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

pub struct RampScheduler<S: Scenario> {
    scenario: Arc<S>,
    schedule: Arc<RunSchedule>,
    collector: Arc<MetricCollector>,
    active: Vec<Worker>,
    draining: Vec<Worker>,
    next_id: u64,
    peak_active: usize,
}

impl<S: Scenario> RampScheduler<S> {
    pub fn new(
        scenario: Arc<S>,
        schedule: Arc<RunSchedule>,
        collector: Arc<MetricCollector>,
    ) -> Self {
        Self {
            scenario,
            schedule,
            collector,
            active: vec![],
            draining: vec![],
            next_id: 1,
            peak_active: 0,
        }
    }

    /// Drives the ramp to completion (or until `stop` fires), then retires every
    /// worker. `on_tick` sees the loop state after each adjustment.
    pub async fn run(mut self, mut stop: StopSignal, mut on_tick: impl FnMut(&Tick)) -> RampOutcome {
        self.collector.register(MetricKey::new(ABANDONED_REQUESTS), MetricKind::Counter);

        let start = Instant::now();
        let end = start + self.schedule.total_duration();
        let mut timer = Timer::new(start, self.schedule.tick_interval());
        debug!(
            "Ramping over {} with a {timer} tick",
            humantime::format_duration(self.schedule.total_duration())
        );

        let deadline = sleep_until(end);
        tokio::pin!(deadline);

        let mut aborted = false;
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    info!("Stop requested, retiring all workers.");
                    aborted = true;
                    break;
                }
                _ = &mut deadline => break,
                at = timer.tick() => {
                    let tick = self.adjust(at.saturating_duration_since(start));
                    on_tick(&tick);
                }
            }
        }
        let elapsed = start.elapsed();

        let drain_start = Instant::now();
        let abandoned_requests = self.shutdown().await;
        if abandoned_requests > 0 {
            self.collector.record(MetricSample::counter(
                ABANDONED_REQUESTS,
                abandoned_requests as f64,
            ));
        }

        RampOutcome {
            elapsed,
            drain: drain_start.elapsed(),
            peak_active: self.peak_active,
            spawned: self.next_id - 1,
            abandoned_requests,
            aborted,
        }
    }

    fn adjust(&mut self, elapsed: Duration) -> Tick {
        self.reap();

        let target = match target_at(&self.schedule, elapsed) {
            Ok(target) => target,
            Err(err) => clamp_violation(err),
        };

        while self.active.len() < target {
            let worker = Worker::spawn(self.next_id, self.scenario.clone(), self.collector.clone());
            self.next_id += 1;
            self.active.push(worker);
        }

        // Most recently spawned first.
        while self.active.len() > target {
            if let Some(worker) = self.active.pop() {
                worker.stop();
                self.draining.push(worker);
            }
        }

        self.peak_active = self.peak_active.max(self.active.len());

        let tick = Tick {
            elapsed,
            stage: stage_at(&self.schedule, elapsed),
            target,
            active: self.active.len(),
            draining: self.draining.len(),
        };
        trace!("{tick:?}");
        tick
    }

    /// Drops finished workers. An active worker should never finish on its own;
    /// if one does it is replaced on this tick.
    fn reap(&mut self) {
        self.draining.retain(|w| !w.is_finished());
        self.active.retain(|w| {
            if w.is_finished() {
                warn!("Virtual user {} exited unexpectedly, replacing it.", w.id);
                false
            } else {
                true
            }
        });
    }

    /// Signals every worker, waits for the graceful-stop window, then aborts the
    /// rest. Returns the requests the aborted workers still had in flight.
    async fn shutdown(&mut self) -> u64 {
        for worker in self.active.drain(..) {
            worker.stop();
            self.draining.push(worker);
        }

        let deadline = Instant::now() + self.schedule.graceful_stop_window();
        let mut abandoned = 0;
        for mut worker in self.draining.drain(..) {
            match timeout_at(deadline, &mut worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Virtual user {} failed: {err}", worker.id),
                Err(_) => {
                    let in_flight = worker.in_flight();
                    warn!(
                        "Virtual user {} did not stop within the graceful-stop window, abandoning {in_flight} request(s).",
                        worker.id
                    );
                    worker.handle.abort();
                    abandoned += in_flight as u64;
                }
            }
        }
        abandoned
    }
}

fn clamp_violation(err: ScheduleError) -> usize {
    if cfg!(debug_assertions) {
        panic!("{err}");
    }
    error!("{err}, clamping.");
    let ScheduleError::Violation { target, max, .. } = err;
    if target.is_nan() {
        0
    } else {
        target.clamp(0., max as f64).round() as usize
    }
}
