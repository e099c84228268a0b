//! Target concurrency as a function of elapsed run time.
use rampart_core::{RunSchedule, ScheduleError, StageShape, StageSpec};
use std::time::Duration;

/// Number of virtual users that should be active `elapsed` into the run.
///
/// The curve starts at 0. A linear stage interpolates from the previous stage's
/// target to its own, a step stage (or a zero-length one) jumps straight to its
/// target. Past the last stage the last target holds.
pub fn target_at(schedule: &RunSchedule, elapsed: Duration) -> Result<usize, ScheduleError> {
    let target = raw_target(schedule.stages(), elapsed);
    let max = schedule.max_target();
    if !(0.0..=max as f64).contains(&target) {
        return Err(ScheduleError::Violation {
            elapsed,
            target,
            max,
        });
    }
    Ok(target.round() as usize)
}

/// Index of the stage covering `elapsed`; the last stage once the run is over.
pub fn stage_at(schedule: &RunSchedule, elapsed: Duration) -> usize {
    let mut end = Duration::ZERO;
    for (idx, stage) in schedule.stages().iter().enumerate() {
        end += stage.duration;
        if elapsed < end {
            return idx;
        }
    }
    schedule.stages().len().saturating_sub(1)
}

fn raw_target(stages: &[StageSpec], elapsed: Duration) -> f64 {
    let mut previous = 0.;
    let mut start = Duration::ZERO;
    for stage in stages {
        let end = start + stage.duration;
        let target = stage.target as f64;
        // Zero-length stages never satisfy this and act as steps.
        if elapsed < end {
            return match stage.shape {
                StageShape::Step => target,
                StageShape::Linear => {
                    let progress =
                        (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                    previous + (target - previous) * progress
                }
            };
        }
        previous = target;
        start = end;
    }
    previous
}
