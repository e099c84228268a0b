use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("A run schedule needs at least one stage.")]
    EmptySchedule,

    #[error("Tick interval must be greater than zero.")]
    ZeroTick,

    #[error("The user pool is empty.")]
    EmptyUserPool,

    #[error("Invalid duration `{value}`: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Invalid threshold: {0}")]
    Threshold(#[from] ThresholdParseError),

    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThresholdParseError {
    #[error("metric selector `{0}` is malformed")]
    Selector(String),

    #[error("expression `{0}` has no comparison operator")]
    MissingOperator(String),

    #[error("unknown aggregation `{0}`")]
    Aggregation(String),

    #[error("`{0}` is not a valid percentile")]
    Percentile(String),

    #[error("`{0}` is not a number")]
    Bound(String),
}

/// The scheduler produced a concurrency target outside of what the schedule allows.
///
/// This is always a bug in the ramp computation rather than a user error.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("target {target} at {elapsed:?} is outside of [0, {max}]")]
    Violation {
        elapsed: Duration,
        target: f64,
        max: usize,
    },
}
