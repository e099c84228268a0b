#![cfg_attr(docsrs, feature(doc_cfg))]
//! Staged load generation.
//!
//! A [`LoadTest`] drives a [`Scenario`] through a [`RunSchedule`]: the ramp
//! scheduler keeps as many virtual users running as the current stage asks for,
//! every request a scenario makes through [`step`] is aggregated by the
//! [`MetricCollector`], and once the ramp is over the schedule's thresholds decide
//! whether the run passed.
//!
//! ```no_run
//! use rampart::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let schedule = RunSchedule::new(vec![
//!         StageSpec::new(Duration::from_secs(30), 10),
//!         StageSpec::new(Duration::from_secs(30), 0),
//!     ])
//!     .unwrap()
//!     .threshold("http_req_failed", "rate<0.01")
//!     .unwrap();
//!
//!     let scenario = ScenarioPreset::Chat.scenario("http://localhost:8080", UserPool::builtin());
//!     let summary = LoadTest::new(scenario, schedule).await;
//!     assert!(summary.passed);
//! }
//! ```

pub mod chat;
pub mod collector;
pub mod controller;
pub mod reporter;
pub mod scenario;
pub mod scheduler;
pub mod step;
pub mod threshold;

pub use collector::MetricCollector;
pub use controller::LoadTest;
pub use reporter::{NoopReporter, Reporter, RunStarted, TracingReporter};
pub use scenario::{HookError, Scenario, VuContext};
pub use scheduler::{stop_channel, RampOutcome, RampScheduler, StopHandle, StopSignal, Tick};
pub use threshold::ThresholdEvaluator;

pub use rampart_core::*;

pub mod prelude {
    pub use crate::chat::{ChatOptions, ChatScenario, ScenarioPreset, UserPool};
    pub use crate::step::{self, Counter, Rate, Trend};
    pub use crate::{LoadTest, Reporter, Scenario, StopHandle, VuContext};

    pub use rampart_core::{
        Environment, LoadProfile, RunSchedule, RunSummary, StageShape, StageSpec,
    };
}
