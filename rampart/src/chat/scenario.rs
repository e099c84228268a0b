use super::client::ChatClient;
use super::session::{self, Session};
use super::users::UserPool;
use super::{CONCURRENT_USERS, ERROR_RATE};
use crate::scenario::{HookError, Scenario, VuContext};
use rampart_core::DEFAULT_PAGE_SIZE;
use rand::{rngs::SmallRng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Fixed think times between steps. A zero duration skips the pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub after_login: Duration,
    pub after_room_list: Duration,
    pub after_public_rooms: Duration,
    /// Applied after every join attempt.
    pub after_join: Duration,
    pub after_messages: Duration,
    pub after_pagination: Duration,
    pub before_direct_messages: Duration,
    pub iteration_end: Duration,
    pub after_failed_login: Duration,
}

impl Pacing {
    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            after_login: Duration::ZERO,
            after_room_list: Duration::ZERO,
            after_public_rooms: Duration::ZERO,
            after_join: Duration::ZERO,
            after_messages: Duration::ZERO,
            after_pagination: Duration::ZERO,
            before_direct_messages: Duration::ZERO,
            iteration_end: Duration::ZERO,
            after_failed_login: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_login: Duration::from_secs(1),
            after_room_list: Duration::from_millis(500),
            after_public_rooms: Duration::from_millis(500),
            after_join: Duration::from_secs(1),
            after_messages: Duration::from_secs(1),
            after_pagination: Duration::from_secs(1),
            before_direct_messages: Duration::from_millis(500),
            iteration_end: Duration::from_secs(2),
            after_failed_login: Duration::ZERO,
        }
    }
}

/// Names the steps record their checks under. `None` skips that check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckNames {
    pub login_status: &'static str,
    pub login_token: Option<&'static str>,
    pub room_list: &'static str,
    pub public_rooms: Option<&'static str>,
    pub join: &'static str,
    pub messages: &'static str,
    pub message_latency: Option<&'static str>,
    pub direct_room: Option<&'static str>,
}

impl CheckNames {
    pub fn chat() -> Self {
        Self {
            login_status: "login status 200",
            login_token: Some("login has token"),
            room_list: "group room list status 200",
            public_rooms: Some("public rooms status 200"),
            join: "join group room status 200 or 400",
            messages: "get messages status 200",
            message_latency: Some("get messages response time < 800ms"),
            direct_room: Some("direct room creation status 200"),
        }
    }

    pub fn quick() -> Self {
        Self {
            login_token: None,
            public_rooms: None,
            join: "join group room success",
            message_latency: None,
            direct_room: None,
            ..Self::chat()
        }
    }

    pub fn stress() -> Self {
        Self {
            login_status: "login successful",
            login_token: None,
            room_list: "room list successful",
            public_rooms: Some("public rooms retrieved"),
            join: "join group room success",
            messages: "messages retrieved",
            message_latency: None,
            direct_room: None,
        }
    }
}

impl Default for CheckNames {
    fn default() -> Self {
        Self::chat()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    pub page_size: u32,
    /// Fetch one follow-up page when the first one says there is more.
    pub follow_pagination: bool,
    /// Run the direct-room branch.
    pub direct_room: bool,
    /// Record `error_rate`, `request_duration` and `concurrent_users`.
    pub stress_metrics: bool,
    pub message_latency_budget: Duration,
    pub pacing: Pacing,
    pub checks: CheckNames,
    /// Seeds room selection; each virtual user derives its own stream from it.
    pub seed: Option<u64>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            follow_pagination: true,
            direct_room: true,
            stress_metrics: false,
            message_latency_budget: Duration::from_millis(800),
            pacing: Pacing::default(),
            checks: CheckNames::chat(),
            seed: None,
        }
    }
}

/// State of one virtual user.
#[derive(Debug)]
pub struct ChatUser {
    pub ordinal: u64,
    /// Position in the user pool.
    pub index: usize,
    rng: SmallRng,
}

/// What one iteration achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// Final state of the group branch.
    pub session: Session,
    /// Cursor-based follow-up pages fetched.
    pub follow_ups: usize,
    pub direct_room: Option<u64>,
    pub direct_messages_fetched: bool,
}

impl Default for IterationReport {
    fn default() -> Self {
        Self {
            session: Session::Unauthenticated,
            follow_ups: 0,
            direct_room: None,
            direct_messages_fetched: false,
        }
    }
}

/// Log in, browse rooms, join one, read its messages and open a direct room.
pub struct ChatScenario {
    name: String,
    client: ChatClient,
    users: Arc<UserPool>,
    options: ChatOptions,
}

impl ChatScenario {
    pub fn new(base_url: impl Into<String>, users: UserPool, options: ChatOptions) -> Self {
        Self::with_client(ChatClient::new(base_url), users, options)
    }

    pub fn with_client(client: ChatClient, users: UserPool, options: ChatOptions) -> Self {
        Self {
            name: "chat".to_string(),
            client,
            users: Arc::new(users),
            options,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn user(&self, ctx: VuContext) -> ChatUser {
        let rng = match self.options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed ^ ctx.id),
            None => SmallRng::from_entropy(),
        };
        ChatUser {
            ordinal: ctx.id,
            index: self.users.index_for(ctx.id),
            rng,
        }
    }

    /// One login-and-interact cycle. Request failures end the branch they
    /// happen in and are only visible through metrics and the report.
    pub async fn run_iteration(&self, user: &mut ChatUser) -> IterationReport {
        let options = &self.options;
        let pacing = &options.pacing;
        let mut report = IterationReport::default();
        if options.stress_metrics {
            CONCURRENT_USERS.add(1.);
        }

        let credentials = self.users.get(user.index);
        let auth = match session::login(&self.client, credentials, options).await {
            Ok(auth) => auth,
            Err(err) => {
                warn!("Login failed for user {}: {err}", credentials.email);
                if options.stress_metrics {
                    ERROR_RATE.add(true);
                }
                pause(pacing.after_failed_login).await;
                return report;
            }
        };
        report.session = Session::Authenticated(auth.clone());
        pause(pacing.after_login).await;

        if let Err(err) = session::list_group_rooms(&self.client, &auth, options).await {
            debug!("{err}");
        }
        pause(pacing.after_room_list).await;

        let discovered =
            session::discover_room(&self.client, auth.clone(), &mut user.rng, options).await;
        pause(pacing.after_public_rooms).await;

        match discovered {
            Ok(Some(discovered)) => {
                report.session = Session::RoomDiscovered(discovered.clone());
                let joined = session::join_room(&self.client, discovered, options).await;
                pause(pacing.after_join).await;
                match joined {
                    Ok(joined) => {
                        report.session = Session::RoomJoined(joined.clone());
                        self.read_group_room(&joined, &mut report).await;
                    }
                    Err(err) => debug!("{err}"),
                }
            }
            Ok(None) => trace!("No open room to join"),
            Err(err) => debug!("{err}"),
        }

        if options.direct_room {
            let partner = self.users.partner_of(user.index);
            match session::open_direct_room(&self.client, &auth, partner, options).await {
                Ok(Some(room_id)) => {
                    report.direct_room = Some(room_id);
                    pause(pacing.before_direct_messages).await;
                    report.direct_messages_fetched =
                        session::fetch_direct_messages(&self.client, &auth, room_id, options)
                            .await
                            .is_ok();
                }
                Ok(None) => trace!("No direct room returned"),
                Err(err) => debug!("{err}"),
            }
        }

        pause(pacing.iteration_end).await;
        report
    }

    async fn read_group_room(&self, joined: &session::RoomJoined, report: &mut IterationReport) {
        let options = &self.options;
        let fetched = match session::fetch_group_messages(&self.client, joined, None, options).await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                debug!("{err}");
                return;
            }
        };
        pause(options.pacing.after_messages).await;

        if options.follow_pagination {
            if let Some(cursor) = fetched.page.as_ref().and_then(|page| page.follow_up()) {
                match session::fetch_group_messages(&self.client, joined, Some(cursor), options)
                    .await
                {
                    Ok(_) => report.follow_ups += 1,
                    Err(err) => debug!("{err}"),
                }
            }
            pause(options.pacing.after_pagination).await;
        }
        report.session = Session::MessagesFetched(fetched);
    }
}

impl Scenario for ChatScenario {
    type User = ChatUser;
    type Setup = Instant;

    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self) -> Result<Instant, HookError> {
        info!("Target: {}", self.client.base_url());
        info!("Test users: {}", self.users.len());
        Ok(Instant::now())
    }

    fn new_user(&self, ctx: VuContext) -> ChatUser {
        self.user(ctx)
    }

    async fn iteration(&self, user: &mut ChatUser) {
        self.run_iteration(user).await;
    }

    async fn teardown(
        &self,
        setup: Option<Instant>,
        elapsed: Duration,
    ) -> Result<String, HookError> {
        let elapsed = setup.map_or(elapsed, |start| start.elapsed());
        Ok(format!("total test time: {:.2}s", elapsed.as_secs_f64()))
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
