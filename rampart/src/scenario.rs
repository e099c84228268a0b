//! The scenario contract workers execute.
use std::error::Error;
use std::future::Future;
use std::time::Duration;

/// Error type returned by scenario lifecycle hooks.
pub type HookError = Box<dyn Error + Send + Sync>;

/// Identity handed to a virtual user when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuContext {
    /// 1-based, strictly increasing across the run. Ids are never reused.
    pub id: u64,
}

impl VuContext {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

/// A load test scenario.
///
/// `setup` runs once before the ramp and `teardown` once after every worker has
/// retired. In between, each virtual user gets its own [`Scenario::User`] and
/// calls [`Scenario::iteration`] in a loop until it is told to stop. Retirement
/// only happens between iterations, so an iteration is never cut short except by
/// a hard stop at the end of the graceful-stop window.
///
/// Iterations must not panic on request failures: record them through
/// [`crate::step`] and return.
///
/// # Example
/// ```no_run
/// use rampart::{step, HookError, Scenario, VuContext};
/// use std::time::Duration;
///
/// struct Ping;
///
/// impl Scenario for Ping {
///     type User = u64;
///     type Setup = ();
///
///     fn name(&self) -> &str {
///         "ping"
///     }
///
///     async fn setup(&self) -> Result<(), HookError> {
///         Ok(())
///     }
///
///     fn new_user(&self, ctx: VuContext) -> u64 {
///         ctx.id
///     }
///
///     async fn iteration(&self, _user: &mut u64) {
///         step::request("ping", async { Ok::<_, ()>(()) }).await;
///         tokio::time::sleep(Duration::from_millis(100)).await;
///     }
///
///     async fn teardown(&self, _setup: Option<()>, elapsed: Duration) -> Result<String, HookError> {
///         Ok(format!("ran for {elapsed:?}"))
///     }
/// }
/// ```
pub trait Scenario: Send + Sync + 'static {
    /// Per-virtual-user state, owned by a single worker.
    type User: Send + 'static;
    /// Fixtures produced by `setup`.
    type Setup: Send + Sync + 'static;

    fn name(&self) -> &str;

    fn setup(&self) -> impl Future<Output = Result<Self::Setup, HookError>> + Send;

    fn new_user(&self, ctx: VuContext) -> Self::User;

    fn iteration<'a>(&'a self, user: &'a mut Self::User) -> impl Future<Output = ()> + Send + 'a;

    /// Receives `None` when setup failed. Returns a human readable summary line.
    fn teardown(
        &self,
        setup: Option<Self::Setup>,
        elapsed: Duration,
    ) -> impl Future<Output = Result<String, HookError>> + Send;
}
