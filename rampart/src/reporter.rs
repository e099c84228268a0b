//! Lifecycle events of a run.
use crate::scenario::HookError;
use rampart_core::{RunSummary, StageSpec, ThresholdOutcome, ThresholdReport};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub struct RunStarted<'a> {
    pub scenario: &'a str,
    pub stages: &'a [StageSpec],
    pub total_duration: Duration,
    pub max_target: usize,
}

/// Receives run lifecycle events. Every method defaults to doing nothing.
pub trait Reporter: Send + Sync {
    fn run_started(&self, _event: &RunStarted<'_>) {}

    fn stage_entered(&self, _index: usize, _stage: &StageSpec, _elapsed: Duration) {}

    fn setup_failed(&self, _error: &HookError) {}

    fn live_evaluation(&self, _elapsed: Duration, _report: &ThresholdReport) {}

    fn teardown_finished(&self, _summary: &str) {}

    fn teardown_failed(&self, _error: &HookError) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Narrates the run through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn run_started(&self, event: &RunStarted<'_>) {
        info!(
            "Starting {}: {} stage(s) over {}, up to {} virtual users",
            event.scenario,
            event.stages.len(),
            humantime::format_duration(event.total_duration),
            event.max_target
        );
    }

    fn stage_entered(&self, index: usize, stage: &StageSpec, elapsed: Duration) {
        info!(
            "Stage {} at {}: {} virtual users over {}",
            index + 1,
            humantime::format_duration(whole_seconds(elapsed)),
            stage.target,
            humantime::format_duration(stage.duration)
        );
    }

    fn setup_failed(&self, error: &HookError) {
        error!("Setup failed, running without fixtures: {error}");
    }

    fn live_evaluation(&self, elapsed: Duration, report: &ThresholdReport) {
        let elapsed = humantime::format_duration(whole_seconds(elapsed));
        if report.passed() {
            debug!("Thresholds holding at {elapsed}");
            return;
        }
        for result in report.failures() {
            warn!(
                "Threshold {} {} crossed at {elapsed} (observed {:?})",
                result.metric, result.condition, result.observed
            );
        }
    }

    fn teardown_finished(&self, summary: &str) {
        info!("{summary}");
    }

    fn teardown_failed(&self, error: &HookError) {
        error!("Teardown failed: {error}");
    }

    fn run_finished(&self, summary: &RunSummary) {
        if summary.passed {
            info!("{} passed", summary.scenario);
        } else {
            for failure in summary
                .thresholds
                .iter()
                .filter(|r| r.outcome == ThresholdOutcome::Fail)
            {
                warn!("Threshold {} {} failed", failure.metric, failure.condition);
            }
            warn!("{} failed", summary.scenario);
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

fn whole_seconds(elapsed: Duration) -> Duration {
    Duration::from_secs(elapsed.as_secs())
}
