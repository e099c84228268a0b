use crate::{
    ConfigError, ThresholdSpec, DEFAULT_GRACEFUL_STOP, DEFAULT_LIVE_EVALUATION_INTERVAL,
    DEFAULT_TICK_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// How the target moves from the previous stage's value to this stage's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageShape {
    /// Interpolate across the stage duration.
    #[default]
    Linear,
    /// Jump to the target when the stage starts.
    Step,
}

/// One window of the ramp: reach `target` concurrent virtual users over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub duration: Duration,
    pub target: usize,
    pub shape: StageShape,
}

impl StageSpec {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self {
            duration,
            target,
            shape: StageShape::Linear,
        }
    }

    pub fn step(duration: Duration, target: usize) -> Self {
        Self {
            duration,
            target,
            shape: StageShape::Step,
        }
    }

    /// Stage with a humantime duration, e.g. `StageSpec::parse("1m", 50)`.
    pub fn parse(duration: &str, target: usize) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_duration(duration)?, target))
    }
}

/// Stages plus the thresholds that decide whether the run passed.
///
/// Built before a run starts and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSchedule {
    stages: Vec<StageSpec>,
    thresholds: Vec<ThresholdSpec>,
    tick: Duration,
    graceful_stop: Duration,
    live_evaluation: Duration,
}

impl RunSchedule {
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }

        Ok(Self {
            stages,
            thresholds: vec![],
            tick: DEFAULT_TICK_INTERVAL,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            live_evaluation: DEFAULT_LIVE_EVALUATION_INTERVAL,
        })
    }

    pub fn threshold(mut self, metric: &str, expr: &str) -> Result<Self, ConfigError> {
        self.thresholds.push(ThresholdSpec::parse(metric, expr)?);
        Ok(self)
    }

    pub fn with_thresholds(mut self, thresholds: Vec<ThresholdSpec>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Result<Self, ConfigError> {
        if tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        self.tick = tick;
        Ok(self)
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn live_evaluation(mut self, interval: Duration) -> Self {
        self.live_evaluation = interval;
        self
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    pub fn thresholds(&self) -> &[ThresholdSpec] {
        &self.thresholds
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    pub fn graceful_stop_window(&self) -> Duration {
        self.graceful_stop
    }

    pub fn live_evaluation_interval(&self) -> Duration {
        self.live_evaluation
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Load a schedule from a JSON file, see [`ScheduleFile`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ScheduleFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        file.try_into()
    }
}

/// On-disk form of a [`RunSchedule`]:
///
/// ```json
/// {
///   "stages": [{ "duration": "30s", "target": 10 }, { "duration": "1m", "target": 0 }],
///   "thresholds": { "http_req_duration": ["p(95)<500"], "http_req_failed": ["rate<0.01"] },
///   "tick": "1s",
///   "gracefulStop": "30s"
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFile {
    pub stages: Vec<StageEntry>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tick: Option<String>,
    #[serde(default)]
    pub graceful_stop: Option<String>,
    #[serde(default)]
    pub live_evaluation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageEntry {
    pub duration: String,
    pub target: usize,
    #[serde(default)]
    pub shape: StageShape,
}

impl TryFrom<ScheduleFile> for RunSchedule {
    type Error = ConfigError;

    fn try_from(file: ScheduleFile) -> Result<Self, Self::Error> {
        let stages = file
            .stages
            .iter()
            .map(|entry| {
                Ok(StageSpec {
                    duration: parse_duration(&entry.duration)?,
                    target: entry.target,
                    shape: entry.shape,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut schedule = RunSchedule::new(stages)?;
        for (metric, exprs) in &file.thresholds {
            for expr in exprs {
                schedule = schedule.threshold(metric, expr)?;
            }
        }
        if let Some(tick) = &file.tick {
            schedule = schedule.tick(parse_duration(tick)?)?;
        }
        if let Some(graceful_stop) = &file.graceful_stop {
            schedule = schedule.graceful_stop(parse_duration(graceful_stop)?);
        }
        if let Some(live) = &file.live_evaluation {
            schedule = schedule.live_evaluation(parse_duration(live)?);
        }
        Ok(schedule)
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        value: value.to_string(),
        source,
    })
}
