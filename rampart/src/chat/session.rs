//! Instrumented steps of a chat session.
//!
//! Each step takes the state it depends on, so the session can only move forward
//! along `Unauthenticated -> Authenticated -> RoomDiscovered -> RoomJoined ->
//! MessagesFetched`. Every request is recorded under its endpoint tag; failures
//! come back as [`StepError`] for the caller to end its branch on.
use super::client::{ChatClient, ChatRoomType, Cursor, JoinOutcome, MessagePage, Room, StepError};
use super::scenario::ChatOptions;
use super::users::TestUser;
use super::{
    ERROR_RATE, MESSAGES_RECEIVED, MESSAGE_LATENCY, REQUEST_DURATION, ROOM_LIST_LATENCY,
};
use crate::step::{self, Timed};
use rand::{seq::SliceRandom, Rng};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub token: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDiscovered {
    pub auth: Authenticated,
    pub room: Room,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomJoined {
    pub auth: Authenticated,
    pub room_id: u64,
    pub outcome: JoinOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessagesFetched {
    pub room_id: u64,
    pub page: Option<MessagePage>,
}

/// Where the group branch of an iteration got to.
#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    Unauthenticated,
    Authenticated(Authenticated),
    RoomDiscovered(RoomDiscovered),
    RoomJoined(RoomJoined),
    MessagesFetched(MessagesFetched),
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Session::Unauthenticated)
    }

    pub fn joined_room(&self) -> Option<u64> {
        match self {
            Session::RoomJoined(joined) => Some(joined.room_id),
            Session::MessagesFetched(fetched) => Some(fetched.room_id),
            _ => None,
        }
    }
}

/// Runs a request under `endpoint`, adding the stress metrics when enabled.
async fn timed<T>(
    endpoint: &'static str,
    options: &ChatOptions,
    request: impl Future<Output = Result<T, StepError>>,
) -> Timed<Result<T, StepError>> {
    let timed = step::request(endpoint, request).await;
    if options.stress_metrics {
        REQUEST_DURATION.add_duration(timed.elapsed);
        ERROR_RATE.add(timed.output.is_err());
    }
    timed
}

fn optional_check(name: Option<&'static str>, passed: bool) {
    if let Some(name) = name {
        step::check(name, passed);
    }
}

pub async fn login(
    client: &ChatClient,
    user: &TestUser,
    options: &ChatOptions,
) -> Result<Authenticated, StepError> {
    let Timed { output, .. } = timed("login", options, client.login(user)).await;

    let answered_ok = matches!(output, Ok(_) | Err(StepError::MissingToken));
    step::check(options.checks.login_status, answered_ok);
    optional_check(options.checks.login_token, output.is_ok());

    output.map(|token| Authenticated {
        token: token.into(),
    })
}

/// Lists the user's group rooms. Only the latency is of interest.
pub async fn list_group_rooms(
    client: &ChatClient,
    auth: &Authenticated,
    options: &ChatOptions,
) -> Result<Vec<Value>, StepError> {
    let Timed { output, elapsed } =
        timed("getRoomList", options, client.group_rooms(&auth.token)).await;
    ROOM_LIST_LATENCY.add_duration(elapsed);
    step::check(options.checks.room_list, output.is_ok());
    output
}

/// Lists public rooms and picks one without a password, uniformly at random.
/// `Ok(None)` when there is no open room.
pub async fn discover_room<R: Rng>(
    client: &ChatClient,
    auth: Authenticated,
    rng: &mut R,
    options: &ChatOptions,
) -> Result<Option<RoomDiscovered>, StepError> {
    let Timed { output, .. } =
        timed("getPublicRooms", options, client.public_rooms(&auth.token)).await;
    optional_check(options.checks.public_rooms, output.is_ok());

    let open: Vec<Room> = output?.into_iter().filter(|r| !r.has_password).collect();
    Ok(open
        .choose(rng)
        .cloned()
        .map(|room| RoomDiscovered { auth, room }))
}

pub async fn join_room(
    client: &ChatClient,
    discovered: RoomDiscovered,
    options: &ChatOptions,
) -> Result<RoomJoined, StepError> {
    let RoomDiscovered { auth, room } = discovered;
    let Timed { output, .. } = timed(
        "joinRoom",
        options,
        client.join_room(&auth.token, room.id, None),
    )
    .await;
    step::check(options.checks.join, output.is_ok());

    output.map(|outcome| RoomJoined {
        auth,
        room_id: room.id,
        outcome,
    })
}

/// Fetches a page of a joined group room. The first page has no cursor.
pub async fn fetch_group_messages(
    client: &ChatClient,
    joined: &RoomJoined,
    cursor: Option<&Cursor>,
    options: &ChatOptions,
) -> Result<MessagesFetched, StepError> {
    let page = fetch_messages(
        client,
        &joined.auth,
        joined.room_id,
        ChatRoomType::Group,
        cursor,
        options,
    )
    .await?;
    Ok(MessagesFetched {
        room_id: joined.room_id,
        page,
    })
}

/// Creates or looks up the direct room with `partner`.
pub async fn open_direct_room(
    client: &ChatClient,
    auth: &Authenticated,
    partner: &TestUser,
    options: &ChatOptions,
) -> Result<Option<u64>, StepError> {
    let Timed { output, .. } = timed(
        "createDirectRoom",
        options,
        client.direct_room(&auth.token, partner.id),
    )
    .await;
    optional_check(options.checks.direct_room, output.is_ok());
    output
}

/// First page of a direct room.
pub async fn fetch_direct_messages(
    client: &ChatClient,
    auth: &Authenticated,
    room_id: u64,
    options: &ChatOptions,
) -> Result<Option<MessagePage>, StepError> {
    fetch_messages(client, auth, room_id, ChatRoomType::Direct, None, options).await
}

async fn fetch_messages(
    client: &ChatClient,
    auth: &Authenticated,
    room_id: u64,
    room_type: ChatRoomType,
    cursor: Option<&Cursor>,
    options: &ChatOptions,
) -> Result<Option<MessagePage>, StepError> {
    let Timed { output, elapsed } = timed(
        "getMessages",
        options,
        client.messages(&auth.token, room_id, room_type, options.page_size, cursor),
    )
    .await;

    MESSAGE_LATENCY.add_duration(elapsed);
    step::check(options.checks.messages, output.is_ok());
    optional_check(
        options.checks.message_latency,
        elapsed < options.message_latency_budget,
    );
    if output.is_ok() {
        MESSAGES_RECEIVED.add(1.);
    }
    output
}
