use std::time::Duration;

/// Interval of the ramp control loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How long workers get to finish their iteration once the last stage has elapsed.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// How often thresholds are evaluated while a run is in progress.
pub const DEFAULT_LIVE_EVALUATION_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Page size used for message fetches.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

// Built-in metrics recorded by the engine for every run.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ABANDONED_REQUESTS: &str = "abandoned_requests";

/// Tag carrying the logical endpoint of a request.
pub const ENDPOINT_TAG: &str = "endpoint";
/// Tag carrying the name of a check.
pub const CHECK_TAG: &str = "check";

/// Per-request timeout of the chat client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
