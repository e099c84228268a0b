use crate::{ConfigError, RunSchedule, StageSpec, DEFAULT_BASE_URL, HTTP_REQ_DURATION, HTTP_REQ_FAILED};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named stage + threshold bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadProfile {
    /// Light check while developing.
    Smoke,
    /// Regular load, used for before/after comparisons.
    #[default]
    Load,
    /// Staircase up to 1000 users to find the breaking point.
    Stress,
    /// Sudden jump from 50 to 500 users and back.
    Spike,
    /// Half an hour at 100 users.
    Soak,
}

impl LoadProfile {
    pub const ALL: [LoadProfile; 5] = [
        LoadProfile::Smoke,
        LoadProfile::Load,
        LoadProfile::Stress,
        LoadProfile::Spike,
        LoadProfile::Soak,
    ];

    /// Looks up a profile by name, falling back to [`LoadProfile::Load`].
    pub fn lookup(name: Option<&str>) -> Self {
        match name {
            None => Self::default(),
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown load profile `{name}`, using `{}`.", Self::default());
                Self::default()
            }),
        }
    }

    pub fn schedule(&self) -> Result<RunSchedule, ConfigError> {
        let (stages, p95_ms, failure_rate): (&[(u64, usize)], u32, f64) = match self {
            LoadProfile::Smoke => (&[(30, 10), (60, 10), (30, 0)], 500, 0.01),
            LoadProfile::Load => (
                &[
                    (60, 50),
                    (180, 50),
                    (60, 100),
                    (180, 100),
                    (60, 200),
                    (180, 200),
                    (120, 0),
                ],
                1000,
                0.01,
            ),
            LoadProfile::Stress => (
                &[
                    (120, 50),
                    (120, 100),
                    (120, 200),
                    (180, 300),
                    (180, 500),
                    (120, 1000),
                    (120, 100),
                    (60, 0),
                ],
                5000,
                0.10,
            ),
            LoadProfile::Spike => (
                &[(30, 50), (10, 500), (120, 500), (10, 50), (60, 50), (30, 0)],
                2000,
                0.05,
            ),
            LoadProfile::Soak => (&[(120, 100), (1800, 100), (120, 0)], 1000, 0.01),
        };

        RunSchedule::new(seconds(stages))?
            .threshold(HTTP_REQ_DURATION, &format!("p(95)<{p95_ms}"))?
            .threshold(HTTP_REQ_FAILED, &format!("rate<{failure_rate}"))
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadProfile::Smoke => "smoke",
            LoadProfile::Load => "load",
            LoadProfile::Stress => "stress",
            LoadProfile::Spike => "spike",
            LoadProfile::Soak => "soak",
        };
        write!(f, "{name}")
    }
}

impl FromStr for LoadProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Deployment the load is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Local,
        Environment::Dev,
        Environment::Staging,
        Environment::Prod,
    ];

    /// Looks up an environment by name, falling back to [`Environment::Local`].
    pub fn lookup(name: Option<&str>) -> Self {
        match name {
            None => Self::default(),
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown environment `{name}`, using `{}`.", Self::default());
                Self::default()
            }),
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Local => DEFAULT_BASE_URL,
            Environment::Dev => "http://dev-api.mixchat.com",
            Environment::Staging => "http://staging-api.mixchat.com",
            Environment::Prod => "http://api.mixchat.com",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Local => "local",
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// An explicit base URL wins over the environment's.
pub fn resolve_base_url(base_url: Option<&str>, environment: Environment) -> String {
    match base_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => environment.base_url().to_string(),
    }
}

fn seconds(stages: &[(u64, usize)]) -> Vec<StageSpec> {
    stages
        .iter()
        .map(|(secs, target)| StageSpec::new(Duration::from_secs(*secs), *target))
        .collect()
}
