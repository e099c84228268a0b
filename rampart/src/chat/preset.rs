use super::scenario::{ChatOptions, ChatScenario, CheckNames, Pacing};
use super::users::UserPool;
use super::ERROR_RATE_METRIC;
use rampart_core::{ConfigError, RunSchedule, StageSpec, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Ready-made chat scenarios, each with its own pacing and schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScenarioPreset {
    /// The full flow with pagination and direct rooms, ramping to 200 users over 14 minutes.
    #[default]
    Chat,
    /// Shorter pauses and no direct rooms, same ramp shape in 5 minutes.
    Quick,
    /// Staircase up to 1000 users with the extra stress metrics.
    Stress,
}

impl ScenarioPreset {
    pub const ALL: [ScenarioPreset; 3] = [
        ScenarioPreset::Chat,
        ScenarioPreset::Quick,
        ScenarioPreset::Stress,
    ];

    pub fn options(&self) -> ChatOptions {
        match self {
            ScenarioPreset::Chat => ChatOptions::default(),
            ScenarioPreset::Quick => ChatOptions {
                follow_pagination: false,
                direct_room: false,
                pacing: Pacing {
                    after_login: Duration::from_millis(500),
                    after_room_list: Duration::from_millis(300),
                    after_public_rooms: Duration::from_millis(300),
                    after_join: Duration::from_millis(300),
                    iteration_end: Duration::from_secs(1),
                    ..Pacing::none()
                },
                checks: CheckNames::quick(),
                ..ChatOptions::default()
            },
            ScenarioPreset::Stress => ChatOptions {
                follow_pagination: false,
                direct_room: false,
                stress_metrics: true,
                pacing: Pacing {
                    after_login: Duration::from_millis(500),
                    after_room_list: Duration::from_millis(300),
                    after_public_rooms: Duration::from_millis(300),
                    after_join: Duration::from_millis(200),
                    iteration_end: Duration::from_secs(1),
                    after_failed_login: Duration::from_secs(1),
                    ..Pacing::none()
                },
                checks: CheckNames::stress(),
                ..ChatOptions::default()
            },
        }
    }

    pub fn schedule(&self) -> Result<RunSchedule, ConfigError> {
        match self {
            ScenarioPreset::Chat => with_chat_thresholds(RunSchedule::new(seconds(&[
                (60, 50),
                (180, 50),
                (60, 100),
                (180, 100),
                (60, 200),
                (180, 200),
                (120, 0),
            ]))?),
            ScenarioPreset::Quick => with_chat_thresholds(RunSchedule::new(seconds(&[
                (30, 50),
                (60, 50),
                (30, 100),
                (60, 100),
                (30, 200),
                (60, 200),
                (30, 0),
            ]))?),
            ScenarioPreset::Stress => RunSchedule::new(seconds(&[
                (120, 50),
                (120, 50),
                (120, 100),
                (120, 100),
                (120, 200),
                (180, 200),
                (120, 300),
                (180, 300),
                (120, 500),
                (180, 500),
                (60, 1000),
                (120, 1000),
                (120, 100),
                (60, 0),
            ]))?
            .threshold(HTTP_REQ_DURATION, "p(95)<5000")?
            .threshold(HTTP_REQ_FAILED, "rate<0.10")?
            .threshold(ERROR_RATE_METRIC, "rate<0.10"),
        }
    }

    pub fn scenario(&self, base_url: impl Into<String>, users: UserPool) -> ChatScenario {
        ChatScenario::new(base_url, users, self.options()).named(self.to_string())
    }
}

fn with_chat_thresholds(schedule: RunSchedule) -> Result<RunSchedule, ConfigError> {
    schedule
        .threshold(HTTP_REQ_DURATION, "p(95)<1000")?
        .threshold(HTTP_REQ_FAILED, "rate<0.01")?
        .threshold("http_req_duration{endpoint:getMessages}", "p(95)<800")?
        .threshold("http_req_duration{endpoint:getRoomList}", "p(95)<500")
}

fn seconds(stages: &[(u64, usize)]) -> Vec<StageSpec> {
    stages
        .iter()
        .map(|(secs, target)| StageSpec::new(Duration::from_secs(*secs), *target))
        .collect()
}

impl fmt::Display for ScenarioPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioPreset::Chat => write!(f, "chat"),
            ScenarioPreset::Quick => write!(f, "quick"),
            ScenarioPreset::Stress => write!(f, "stress"),
        }
    }
}

impl FromStr for ScenarioPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown scenario `{s}`, expected one of chat, quick, stress"))
    }
}
