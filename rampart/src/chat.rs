//! Load scenario for the chat REST API.
//!
//! A virtual user logs in with an account from the [`UserPool`], lists its group
//! rooms, joins a random open public room, reads its messages (following one page
//! of pagination) and opens a direct room with the next account of the pool.
//! [`ScenarioPreset`] bundles the pacing and schedules of the chat, quick and
//! stress variants.
use crate::step::{Counter, Rate, Trend};

mod client;
mod preset;
mod scenario;
pub mod session;
mod users;

pub use client::{ChatClient, ChatRoomType, Cursor, JoinOutcome, MessagePage, Room, StepError};
pub use preset::ScenarioPreset;
pub use scenario::{ChatOptions, ChatScenario, ChatUser, CheckNames, IterationReport, Pacing};
pub use session::Session;
pub use users::{TestUser, UserPool};

pub const ERROR_RATE_METRIC: &str = "error_rate";

pub const MESSAGES_RECEIVED: Counter = Counter::new("messages_received");
pub const MESSAGE_LATENCY: Trend = Trend::new("message_latency");
pub const ROOM_LIST_LATENCY: Trend = Trend::new("room_list_latency");

// Stress preset only.
pub const ERROR_RATE: Rate = Rate::new(ERROR_RATE_METRIC);
pub const REQUEST_DURATION: Trend = Trend::new("request_duration");
pub const CONCURRENT_USERS: Counter = Counter::new("concurrent_users");
