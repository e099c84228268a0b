//! In-process stand-in for the chat API, recording every request it serves.
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub use axum::http::StatusCode;

/// Canned responses of the mock.
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub token: String,
    pub login_status: StatusCode,
    pub group_rooms: Vec<Value>,
    pub public_rooms: Vec<Value>,
    pub join_status: StatusCode,
    /// `messagePageResp` served when no cursor is given.
    pub first_page: Value,
    /// Pages served by cursor. Unknown cursors get a 404.
    pub pages: HashMap<String, Value>,
    /// `None` answers the direct-room call with a null id.
    pub direct_room_id: Option<u64>,
    /// Added to every response.
    pub delay: Duration,
    /// Requests per second before answering 429.
    pub max_rps: Option<NonZeroU32>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            token: "mock-token".to_string(),
            login_status: StatusCode::OK,
            group_rooms: vec![json!({"id": 10, "name": "mine"})],
            public_rooms: vec![
                json!({"id": 1, "name": "open", "hasPassword": false}),
                json!({"id": 2, "name": "locked", "hasPassword": true}),
            ],
            join_status: StatusCode::OK,
            first_page: json!({
                "messages": [{"id": 1, "content": "hello"}],
                "nextCursor": "c2",
                "hasMore": true,
            }),
            pages: HashMap::from([(
                "c2".to_string(),
                json!({
                    "messages": [{"id": 0, "content": "first"}],
                    "nextCursor": "c3",
                    "hasMore": false,
                }),
            )]),
            direct_room_id: Some(77),
            delay: Duration::ZERO,
            max_rps: None,
        }
    }
}

/// A request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    /// Value of a query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

/// Handle on a mock served in the background.
#[derive(Clone)]
pub struct MockHandle {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests served so far, in arrival order.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded requests whose path ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.recorded()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }
}

/// Serves the mock on an ephemeral localhost port.
pub async fn spawn(config: MockConfig) -> std::io::Result<MockHandle> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(config);
    let recorded = state.recorded.clone();

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(state)).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    Ok(MockHandle { addr, recorded })
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router(AppState::new(config))).await
}

impl AppState {
    fn new(config: MockConfig) -> Self {
        let limiter = config
            .max_rps
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        Self {
            config: Arc::new(config),
            recorded: Arc::new(Mutex::new(vec![])),
            limiter,
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/chats/rooms/group", get(group_rooms))
        .route("/api/v1/chats/rooms/group/public", get(public_rooms))
        .route("/api/v1/chats/rooms/group/:room_id/join", post(join_room))
        .route("/api/v1/chats/rooms/:room_id/messages", get(messages))
        .route("/api/v1/chats/rooms/direct", post(direct_room))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    counter!("mock_service.requests").increment(1);
    let entry = RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        body: serde_json::from_slice(&bytes).ok(),
        authorization: parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    debug!("{} {}", entry.method, entry.path);
    state
        .recorded
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(entry);

    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn authorized(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Bearer {}", state.config.token);
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    #[allow(unused)]
    password: String,
}

async fn login(State(state): State<AppState>, Json(credentials): Json<Credentials>) -> Response {
    if state.config.login_status != StatusCode::OK {
        debug!("Rejecting login of {}", credentials.email);
        let body = json!({"message": "invalid credentials"});
        return (state.config.login_status, Json(body)).into_response();
    }
    Json(json!({"data": state.config.token})).into_response()
}

async fn group_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&state, &headers)?;
    Ok(Json(json!({"data": state.config.group_rooms})))
}

async fn public_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&state, &headers)?;
    Ok(Json(json!({"data": state.config.public_rooms})))
}

async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    authorized(&state, &headers)?;
    debug!("Join of room {room_id}");
    Ok((state.config.join_status, Json(json!({"data": null}))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    #[allow(unused)]
    chat_room_type: String,
    #[allow(unused)]
    size: u32,
    cursor: Option<String>,
}

async fn messages(
    State(state): State<AppState>,
    Path(room_id): Path<u64>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&state, &headers)?;
    let page = match &query.cursor {
        None => state.config.first_page.clone(),
        Some(cursor) => state
            .config
            .pages
            .get(cursor)
            .cloned()
            .ok_or(StatusCode::NOT_FOUND)?,
    };
    debug!("Messages of room {room_id}, cursor {:?}", query.cursor);
    Ok(Json(json!({"data": {"messagePageResp": page}})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectRoomRequest {
    partner_id: u64,
}

async fn direct_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DirectRoomRequest>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&state, &headers)?;
    debug!("Direct room with {}", request.partner_id);
    Ok(Json(json!({"data": {"roomId": state.config.direct_room_id}})))
}
