//! HTTP bindings of the chat API.
use super::users::TestUser;
use rampart_core::DEFAULT_REQUEST_TIMEOUT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("login rejected with status {0}")]
    AuthFailure(StatusCode),

    #[error("login response carried no token")]
    MissingToken,

    #[error("{endpoint} returned unexpected status {status}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: StatusCode,
    },

    #[error("{endpoint} returned a malformed body: {source}")]
    MalformedBody {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    data: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: u64,
    #[serde(default)]
    pub has_password: bool,
}

/// Opaque pagination cursor, echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Text(String),
    Number(i64),
}

impl Cursor {
    /// Empty and zero cursors mean there is nothing to follow.
    pub fn is_present(&self) -> bool {
        match self {
            Cursor::Text(text) => !text.is_empty(),
            Cursor::Number(n) => *n != 0,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Text(text) => write!(f, "{text}"),
            Cursor::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
    #[serde(default)]
    pub has_more: bool,
}

impl MessagePage {
    /// Cursor of the next page, if the server says there is one.
    pub fn follow_up(&self) -> Option<&Cursor> {
        if self.has_more {
            self.next_cursor.as_ref().filter(|c| c.is_present())
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesData {
    #[serde(default)]
    message_page_resp: Option<MessagePage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectRoom {
    #[serde(default)]
    room_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoomType {
    Group,
    Direct,
}

impl ChatRoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRoomType::Group => "GROUP",
            ChatRoomType::Direct => "DIRECT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct JoinRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectRoomRequest {
    partner_id: u64,
}

/// Thin client over the chat REST API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/v1/auth/login`, returns the bearer token.
    pub async fn login(&self, user: &TestUser) -> Result<String, StepError> {
        const ENDPOINT: &str = "login";
        let request = self.http.post(self.url("/api/v1/auth/login")).json(&LoginRequest {
            email: &user.email,
            password: &user.password,
        });

        let response = self.send(ENDPOINT, request).await?;
        if response.status() != StatusCode::OK {
            return Err(StepError::AuthFailure(response.status()));
        }
        let body: Envelope<Value> = decode(ENDPOINT, response).await?;
        match body.data {
            Value::String(token) => Ok(token),
            _ => Err(StepError::MissingToken),
        }
    }

    /// `GET /api/v1/chats/rooms/group`
    pub async fn group_rooms(&self, token: &str) -> Result<Vec<Value>, StepError> {
        const ENDPOINT: &str = "getRoomList";
        let request = self
            .http
            .get(self.url("/api/v1/chats/rooms/group"))
            .bearer_auth(token);
        let response = expect_ok(ENDPOINT, self.send(ENDPOINT, request).await?)?;
        let body: Envelope<Option<Vec<Value>>> = decode(ENDPOINT, response).await?;
        Ok(body.data.unwrap_or_default())
    }

    /// `GET /api/v1/chats/rooms/group/public`
    pub async fn public_rooms(&self, token: &str) -> Result<Vec<Room>, StepError> {
        const ENDPOINT: &str = "getPublicRooms";
        let request = self
            .http
            .get(self.url("/api/v1/chats/rooms/group/public"))
            .bearer_auth(token);
        let response = expect_ok(ENDPOINT, self.send(ENDPOINT, request).await?)?;
        let body: Envelope<Option<Vec<Room>>> = decode(ENDPOINT, response).await?;
        Ok(body.data.unwrap_or_default())
    }

    /// `POST /api/v1/chats/rooms/group/{roomId}/join`. A 400 means the user is
    /// already a member.
    pub async fn join_room(
        &self,
        token: &str,
        room_id: u64,
        password: Option<&str>,
    ) -> Result<JoinOutcome, StepError> {
        const ENDPOINT: &str = "joinRoom";
        let request = self
            .http
            .post(self.url(&format!("/api/v1/chats/rooms/group/{room_id}/join")))
            .bearer_auth(token)
            .json(&JoinRequest { password });

        let response = self.send(ENDPOINT, request).await?;
        match response.status() {
            StatusCode::OK => Ok(JoinOutcome::Joined),
            StatusCode::BAD_REQUEST => Ok(JoinOutcome::AlreadyMember),
            status => Err(StepError::UnexpectedStatus {
                endpoint: ENDPOINT,
                status,
            }),
        }
    }

    /// `GET /api/v1/chats/rooms/{roomId}/messages`. `None` when the response has
    /// no page.
    pub async fn messages(
        &self,
        token: &str,
        room_id: u64,
        room_type: ChatRoomType,
        size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Option<MessagePage>, StepError> {
        const ENDPOINT: &str = "getMessages";
        let mut query = vec![
            ("chatRoomType", room_type.as_str().to_string()),
            ("size", size.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let request = self
            .http
            .get(self.url(&format!("/api/v1/chats/rooms/{room_id}/messages")))
            .bearer_auth(token)
            .query(&query);
        let response = expect_ok(ENDPOINT, self.send(ENDPOINT, request).await?)?;
        let body: Envelope<MessagesData> = decode(ENDPOINT, response).await?;
        Ok(body.data.message_page_resp)
    }

    /// `POST /api/v1/chats/rooms/direct`, creating the room if needed.
    pub async fn direct_room(&self, token: &str, partner_id: u64) -> Result<Option<u64>, StepError> {
        const ENDPOINT: &str = "createDirectRoom";
        let request = self
            .http
            .post(self.url("/api/v1/chats/rooms/direct"))
            .bearer_auth(token)
            .json(&DirectRoomRequest { partner_id });
        let response = expect_ok(ENDPOINT, self.send(ENDPOINT, request).await?)?;
        let body: Envelope<DirectRoom> = decode(ENDPOINT, response).await?;
        Ok(body.data.room_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, StepError> {
        request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| StepError::Transport { endpoint, source })
    }
}

fn expect_ok(endpoint: &'static str, response: Response) -> Result<Response, StepError> {
    match response.status() {
        StatusCode::OK => Ok(response),
        status => Err(StepError::UnexpectedStatus { endpoint, status }),
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, StepError> {
    response
        .json()
        .await
        .map_err(|source| StepError::MalformedBody { endpoint, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_page_follow_up() {
        let page: MessagePage = serde_json::from_str(
            r#"{"messages": [{"id": 1}], "nextCursor": "c2", "hasMore": true}"#,
        )
        .unwrap();
        assert_eq!(page.follow_up(), Some(&Cursor::Text("c2".into())));

        let last: MessagePage =
            serde_json::from_str(r#"{"messages": [], "nextCursor": "c3", "hasMore": false}"#)
                .unwrap();
        assert_eq!(last.follow_up(), None);

        let numeric: MessagePage =
            serde_json::from_str(r#"{"nextCursor": 1042, "hasMore": true}"#).unwrap();
        assert_eq!(numeric.follow_up().map(|c| c.to_string()), Some("1042".into()));

        let blank: MessagePage =
            serde_json::from_str(r#"{"nextCursor": "", "hasMore": true}"#).unwrap();
        assert_eq!(blank.follow_up(), None);
    }

    #[test]
    fn rooms_default_to_no_password() {
        let rooms: Envelope<Option<Vec<Room>>> = serde_json::from_str(
            r#"{"data": [{"id": 1, "hasPassword": false, "name": "a"}, {"id": 2, "hasPassword": true}, {"id": 3}]}"#,
        )
        .unwrap();
        let open: Vec<_> = rooms
            .data
            .unwrap()
            .into_iter()
            .filter(|r| !r.has_password)
            .map(|r| r.id)
            .collect();
        assert_eq!(open, vec![1, 3]);
    }

    #[test]
    fn null_room_list_is_empty() {
        let body: Envelope<Option<Vec<Value>>> = serde_json::from_str(r#"{"data": null}"#).unwrap();
        assert!(body.data.unwrap_or_default().is_empty());
    }

    #[test]
    fn messages_envelope_without_page() {
        let body: Envelope<MessagesData> = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        assert!(body.data.message_page_resp.is_none());
    }
}
