//! Run sequencing: setup, ramp, teardown, verdict.
use crate::collector::MetricCollector;
use crate::reporter::{Reporter, RunStarted, TracingReporter};
use crate::scenario::Scenario;
use crate::scheduler::{stop_channel, RampScheduler, StopHandle, StopSignal};
use crate::threshold::ThresholdEvaluator;
use rampart_core::{summarize_metrics, RunSchedule, RunSummary};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// A configured load test. Awaiting it runs the test and yields its [`RunSummary`].
///
/// # Example
/// ```no_run
/// use rampart::chat::{ChatScenario, ScenarioPreset, UserPool};
/// use rampart::LoadTest;
///
/// #[tokio::main]
/// async fn main() {
///     let preset = ScenarioPreset::Quick;
///     let scenario = ChatScenario::new(
///         "http://localhost:8080",
///         UserPool::builtin(),
///         preset.options(),
///     );
///     let summary = LoadTest::new(scenario, preset.schedule().unwrap()).await;
///     println!("{summary}");
/// }
/// ```
pub struct LoadTest<S: Scenario> {
    scenario: Arc<S>,
    schedule: Arc<RunSchedule>,
    reporter: Arc<dyn Reporter>,
    collector: Arc<MetricCollector>,
    stop_handle: StopHandle,
    stop: StopSignal,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunSummary> + Send>>>,
}

impl<S: Scenario> LoadTest<S> {
    pub fn new(scenario: S, schedule: RunSchedule) -> Self {
        let (stop_handle, stop) = stop_channel();
        Self {
            scenario: Arc::new(scenario),
            schedule: Arc::new(schedule),
            reporter: Arc::new(TracingReporter),
            collector: Arc::new(MetricCollector::new()),
            stop_handle,
            stop,
            runner_fut: None,
        }
    }

    /// Replaces the default [`TracingReporter`].
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Handle that ends the ramp early. Workers are still drained and teardown
    /// still runs.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Collector the run records into.
    pub fn collector(&self) -> Arc<MetricCollector> {
        self.collector.clone()
    }
}

impl<S: Scenario> Future for LoadTest<S> {
    type Output = RunSummary;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.runner_fut.is_none() {
            let scenario = self.scenario.clone();
            let schedule = self.schedule.clone();
            let reporter = self.reporter.clone();
            let collector = self.collector.clone();
            let stop = self.stop.clone();
            self.runner_fut = Some(Box::pin(async move {
                run_load_test(scenario, schedule, reporter, collector, stop).await
            }));
        }

        if let Some(runner) = &mut self.runner_fut {
            runner.as_mut().poll(cx)
        } else {
            unreachable!()
        }
    }
}

#[instrument(name = "load_test", skip_all, fields(scenario = %scenario.name()))]
async fn run_load_test<S: Scenario>(
    scenario: Arc<S>,
    schedule: Arc<RunSchedule>,
    reporter: Arc<dyn Reporter>,
    collector: Arc<MetricCollector>,
    stop: StopSignal,
) -> RunSummary {
    let run_start = Instant::now();
    reporter.run_started(&RunStarted {
        scenario: scenario.name(),
        stages: schedule.stages(),
        total_duration: schedule.total_duration(),
        max_target: schedule.max_target(),
    });
    let evaluator = ThresholdEvaluator::new(schedule.thresholds());

    let (setup, setup_error) = match scenario.setup().await {
        Ok(setup) => (Some(setup), None),
        Err(err) => {
            reporter.setup_failed(&err);
            (None, Some(err.to_string()))
        }
    };

    let live_interval = schedule.live_evaluation_interval();
    let live_selectors = evaluator.selectors();
    let mut next_evaluation = live_interval;
    let mut current_stage = None;
    let ramp = RampScheduler::new(scenario.clone(), schedule.clone(), collector.clone())
        .run(stop, |tick| {
            if current_stage != Some(tick.stage) {
                current_stage = Some(tick.stage);
                if let Some(stage) = schedule.stages().get(tick.stage) {
                    reporter.stage_entered(tick.stage, stage, tick.elapsed);
                }
            }

            if !live_interval.is_zero() && tick.elapsed >= next_evaluation {
                let snapshot = collector.snapshot_matching(&live_selectors);
                reporter.live_evaluation(tick.elapsed, &evaluator.evaluate(&snapshot));
                while next_evaluation <= tick.elapsed {
                    next_evaluation += live_interval;
                }
            }
        })
        .await;
    debug!(
        "Ramp finished after {:?}, drained in {:?}",
        ramp.elapsed, ramp.drain
    );

    let teardown = match scenario.teardown(setup, run_start.elapsed()).await {
        Ok(summary) => {
            reporter.teardown_finished(&summary);
            Some(summary)
        }
        Err(err) => {
            reporter.teardown_failed(&err);
            Some(format!("teardown failed: {err}"))
        }
    };

    let snapshot = collector.snapshot();
    let report = evaluator.evaluate(&snapshot);
    let summary = RunSummary {
        scenario: scenario.name().to_string(),
        passed: report.passed(),
        aborted: ramp.aborted,
        elapsed: ramp.elapsed,
        thresholds: report.results,
        metrics: summarize_metrics(&snapshot),
        peak_active_workers: ramp.peak_active,
        spawned_workers: ramp.spawned as usize,
        abandoned_requests: ramp.abandoned_requests,
        setup_error,
        teardown,
    };
    reporter.run_finished(&summary);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NoopReporter;
    use crate::scenario::mock::MockScenario;
    use rampart_core::{StageSpec, ThresholdOutcome, ThresholdReport, ITERATIONS};
    use std::sync::Mutex;
    use std::time::Duration;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl Reporter for Arc<RecordingReporter> {
        fn stage_entered(&self, index: usize, _stage: &StageSpec, _elapsed: Duration) {
            self.events.lock().unwrap().push(format!("stage {index}"));
        }

        fn setup_failed(&self, error: &crate::HookError) {
            self.events.lock().unwrap().push(format!("setup failed: {error}"));
        }

        fn live_evaluation(&self, elapsed: Duration, _report: &ThresholdReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("live {}", elapsed.as_secs()));
        }

        fn teardown_finished(&self, summary: &str) {
            self.events.lock().unwrap().push(summary.to_string());
        }

        fn teardown_failed(&self, error: &crate::HookError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("teardown failed: {error}"));
        }

        fn run_finished(&self, summary: &RunSummary) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {}", summary.passed));
        }
    }

    fn schedule() -> RunSchedule {
        RunSchedule::new(vec![StageSpec::new(secs(4), 2), StageSpec::new(secs(4), 0)])
            .unwrap()
            .live_evaluation(secs(3))
            .threshold("http_req_duration", "p(95)<1000")
            .unwrap()
            .threshold("http_req_failed", "rate<0.01")
            .unwrap()
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn runs_setup_ramp_and_teardown_in_order() {
        let reporter = Arc::new(RecordingReporter::default());
        let summary = LoadTest::new(MockScenario::new(Duration::from_millis(300)), schedule())
            .reporter(reporter.clone())
            .await;

        assert!(summary.passed);
        assert!(!summary.aborted);
        assert_eq!(summary.elapsed, secs(8));
        assert_eq!(summary.abandoned_requests, 0);
        assert_eq!(summary.peak_active_workers, 2);
        assert_eq!(summary.teardown.as_deref(), Some("teardown with fixture after 8.20s"));
        assert!(summary.thresholds.iter().all(|t| t.outcome == ThresholdOutcome::Pass));
        assert!(summary.metric(ITERATIONS).is_some());

        let events = reporter.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "stage 0".to_string(),
                "live 3".to_string(),
                "stage 1".to_string(),
                "live 6".to_string(),
                "teardown with fixture after 8.20s".to_string(),
                "finished true".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn setup_failure_still_runs_the_ramp() {
        let scenario = MockScenario {
            fail_setup: true,
            ..MockScenario::new(Duration::from_millis(100))
        };
        let iterations = scenario.iterations.clone();

        let summary = LoadTest::new(scenario, schedule()).reporter(NoopReporter).await;

        assert_eq!(summary.setup_error.as_deref(), Some("setup exploded"));
        assert!(summary.teardown.unwrap().starts_with("teardown with nothing"));
        assert!(iterations.load(std::sync::atomic::Ordering::Acquire) > 0);
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn teardown_failure_is_reported() {
        let reporter = Arc::new(RecordingReporter::default());
        let scenario = MockScenario {
            fail_teardown: true,
            ..MockScenario::new(Duration::from_millis(300))
        };
        let schedule = schedule().threshold("iterations", "count<1").unwrap();

        let summary = LoadTest::new(scenario, schedule)
            .reporter(reporter.clone())
            .await;

        assert_eq!(summary.teardown.as_deref(), Some("teardown failed: teardown exploded"));
        assert_eq!(summary.thresholds.len(), 3);
        assert!(!summary.passed);
        assert_eq!(summary.elapsed, secs(8));

        let events = reporter.events.lock().unwrap().clone();
        let tail = &events[events.len() - 2..];
        assert_eq!(
            tail,
            &[
                "teardown failed: teardown exploded".to_string(),
                "finished false".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn breached_threshold_fails_the_run() {
        let schedule = schedule().threshold("iterations", "count<1").unwrap();
        let summary = LoadTest::new(MockScenario::new(Duration::from_millis(100)), schedule)
            .reporter(NoopReporter)
            .await;

        assert!(!summary.passed);
        assert_eq!(
            summary
                .thresholds
                .iter()
                .filter(|t| t.outcome == ThresholdOutcome::Fail)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn stop_handle_aborts_the_run() {
        let test = LoadTest::new(
            MockScenario::new(Duration::from_millis(100)),
            RunSchedule::new(vec![StageSpec::step(secs(600), 3)]).unwrap(),
        )
        .reporter(NoopReporter);
        let handle = test.stop_handle();

        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            handle.stop();
        });
        let summary = test.await;

        assert!(summary.aborted);
        assert_eq!(summary.elapsed, secs(5));
        assert!(summary.teardown.is_some());
    }
}
