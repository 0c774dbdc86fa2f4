//! Thin reqwest wrapper over the Matrix client-server API (v3).

use std::time::Duration;

use organ_shared::constants::{STATE_TYPE_ROOM_TYPE, STATE_TYPE_ROOT_EVENT_ID};
use organ_shared::protocol::{RoomTypeContent, RootEventIdContent};
use organ_shared::{EventId, RoomId, RoomType};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{
    CreateRoomRequest, CreateRoomResponse, ErrorResponse, EventIdResponse, JoinedRoomsResponse,
    LoginRequest, LoginResponse, MessagesResponse, RoomNameContent, SyncResponse, UserIdentifier,
    WhoamiResponse,
};
use crate::error::NetError;

const CLIENT_API_PREFIX: [&str; 3] = ["_matrix", "client", "v3"];

/// Extra time allowed on top of the `/sync` long-poll timeout.
const SYNC_GRACE: Duration = Duration::from_secs(10);

/// Credentials of a logged-in device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    session: Option<Session>,
}

impl MatrixClient {
    pub fn new(homeserver: &str) -> Result<Self, NetError> {
        let homeserver = Url::parse(homeserver)
            .map_err(|e| NetError::InvalidHomeserver(format!("{homeserver}: {e}")))?;
        if homeserver.cannot_be_a_base() {
            return Err(NetError::InvalidHomeserver(homeserver.to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            homeserver,
            session: None,
        })
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.homeserver.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(CLIENT_API_PREFIX).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, NetError> {
        let session = self.session.as_ref().ok_or(NetError::NotLoggedIn)?;
        Ok(self
            .http
            .request(method, self.endpoint(segments))
            .bearer_auth(&session.access_token))
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, NetError> {
        let response = builder.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: Response) -> Result<Response, NetError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error: ErrorResponse = serde_json::from_str(&body).unwrap_or(ErrorResponse {
            errcode: String::new(),
            error: body,
        });
        Err(NetError::Matrix {
            status: status.as_u16(),
            errcode: error.errcode,
            message: error.error,
        })
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Password login.  On success the client adopts the new session.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<Session, NetError> {
        let body = LoginRequest {
            login_type: "m.login.password",
            identifier: UserIdentifier {
                id_type: "m.id.user",
                user,
            },
            password,
            initial_device_display_name: organ_shared::constants::APP_NAME,
        };
        let builder = self.http.post(self.endpoint(&["login"])).json(&body);
        let response: LoginResponse = Self::send(builder).await?;

        info!(user = %response.user_id, "Logged in");
        let session = Session {
            user_id: response.user_id,
            access_token: response.access_token,
            device_id: response.device_id,
        };
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Resolve the user id owning the current access token.
    pub async fn whoami(&self) -> Result<String, NetError> {
        let builder = self.request(Method::GET, &["account", "whoami"])?;
        let response: WhoamiResponse = Self::send(builder).await?;
        Ok(response.user_id)
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub async fn joined_rooms(&self) -> Result<Vec<RoomId>, NetError> {
        let builder = self.request(Method::GET, &["joined_rooms"])?;
        let response: JoinedRoomsResponse = Self::send(builder).await?;
        Ok(response.joined_rooms)
    }

    /// Fetch one state event's content.  Missing state reads as `None`.
    pub async fn state_event<T: DeserializeOwned>(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<T>, NetError> {
        let builder = self.request(
            Method::GET,
            &["rooms", room_id.as_str(), "state", event_type, state_key],
        )?;
        match Self::send(builder).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn room_name(&self, room_id: &RoomId) -> Result<Option<String>, NetError> {
        let content: Option<RoomNameContent> =
            self.state_event(room_id, "m.room.name", "").await?;
        Ok(content.map(|c| c.name).filter(|name| !name.is_empty()))
    }

    /// The Organ room-type tag, or `None` for an ordinary room.
    pub async fn room_type(&self, room_id: &RoomId) -> Result<Option<RoomType>, NetError> {
        // Unknown tags come back as a parse failure; treat them as untagged.
        let content: Option<Value> = self.state_event(room_id, STATE_TYPE_ROOM_TYPE, "").await?;
        Ok(content
            .and_then(|v| serde_json::from_value::<RoomTypeContent>(v).ok())
            .map(|c| c.room_type))
    }

    pub async fn root_event_id(&self, room_id: &RoomId) -> Result<Option<EventId>, NetError> {
        let content: Option<RootEventIdContent> =
            self.state_event(room_id, STATE_TYPE_ROOT_EVENT_ID, "").await?;
        Ok(content.map(|c| c.root_event_id))
    }

    /// Create a private room and return its id.
    pub async fn create_room(&self, name: &str) -> Result<RoomId, NetError> {
        let body = CreateRoomRequest {
            name,
            preset: "private_chat",
        };
        let builder = self.request(Method::POST, &["createRoom"])?.json(&body);
        let response: CreateRoomResponse = Self::send(builder).await?;
        info!(room = %response.room_id, name, "Created room");
        Ok(response.room_id)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Send a timeline event with a fresh transaction id.
    pub async fn send_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: &Value,
    ) -> Result<EventId, NetError> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let builder = self
            .request(
                Method::PUT,
                &["rooms", room_id.as_str(), "send", event_type, &txn_id],
            )?
            .json(content);
        let response: EventIdResponse = Self::send(builder).await?;
        debug!(room = %room_id, event = %response.event_id, event_type, "Sent event");
        Ok(response.event_id)
    }

    pub async fn send_state_event(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<EventId, NetError> {
        let builder = self
            .request(
                Method::PUT,
                &["rooms", room_id.as_str(), "state", event_type, state_key],
            )?
            .json(content);
        let response: EventIdResponse = Self::send(builder).await?;
        debug!(room = %room_id, event = %response.event_id, event_type, "Sent state event");
        Ok(response.event_id)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Long-poll `/sync`.  `since` is the previous `next_batch`, if any.
    pub async fn sync(
        &self,
        since: Option<&str>,
        timeout: Duration,
    ) -> Result<SyncResponse, NetError> {
        let mut query = vec![("timeout", timeout.as_millis().to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        let builder = self
            .request(Method::GET, &["sync"])?
            .query(&query)
            .timeout(timeout + SYNC_GRACE);
        Self::send(builder).await
    }

    /// Page backwards through a room's history from `from`.
    pub async fn messages(
        &self,
        room_id: &RoomId,
        from: Option<&str>,
        limit: u32,
    ) -> Result<MessagesResponse, NetError> {
        let mut query = vec![("dir", "b".to_string()), ("limit", limit.to_string())];
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        let builder = self
            .request(Method::GET, &["rooms", room_id.as_str(), "messages"])?
            .query(&query);
        Self::send(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            user_id: "@me:x".into(),
            access_token: "token".into(),
            device_id: None,
        }
    }

    async fn logged_in(server: &MockServer) -> MatrixClient {
        MatrixClient::new(&server.uri()).unwrap().with_session(session())
    }

    #[tokio::test]
    async fn login_adopts_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/login"))
            .and(body_partial_json(json!({
                "type": "m.login.password",
                "identifier": { "type": "m.id.user", "user": "me" },
                "password": "hunter2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": "@me:x",
                "access_token": "token",
                "device_id": "DEV"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = MatrixClient::new(&server.uri()).unwrap();
        let session = client.login("me", "hunter2").await.unwrap();
        assert_eq!(session.user_id, "@me:x");
        assert_eq!(client.session(), Some(&session));
    }

    #[tokio::test]
    async fn login_failure_carries_errcode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/login"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errcode": "M_FORBIDDEN",
                "error": "Invalid password"
            })))
            .mount(&server)
            .await;

        let mut client = MatrixClient::new(&server.uri()).unwrap();
        let err = client.login("me", "wrong").await.unwrap_err();
        match err {
            NetError::Matrix { status, errcode, .. } => {
                assert_eq!(status, 403);
                assert_eq!(errcode, "M_FORBIDDEN");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn authenticated_calls_need_a_session() {
        let client = MatrixClient::new("https://matrix.example.org").unwrap();
        assert!(matches!(
            client.joined_rooms().await,
            Err(NetError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn create_room_then_tag_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/createRoom"))
            .and(header("authorization", "Bearer token"))
            .and(body_partial_json(json!({ "name": "Gigs" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "room_id": "!new:x" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(
                "/_matrix/client/v3/rooms/!new:x/state/directory.radical.room_type.v1/",
            ))
            .and(body_partial_json(json!({ "room_type": "calendar" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event_id": "$s1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = logged_in(&server).await;
        let room_id = client.create_room("Gigs").await.unwrap();
        assert_eq!(room_id, RoomId::new("!new:x"));

        let event_id = client
            .send_state_event(
                &room_id,
                STATE_TYPE_ROOM_TYPE,
                "",
                &json!({ "room_type": "calendar" }),
            )
            .await
            .unwrap();
        assert_eq!(event_id, EventId::new("$s1"));
    }

    #[tokio::test]
    async fn send_event_uses_a_transaction_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(
                r"^/_matrix/client/v3/rooms/!c:x/send/directory\.radical\.event\.v1/[0-9a-f-]{36}$",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "event_id": "$e1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = logged_in(&server).await;
        let event_id = client
            .send_event(
                &"!c:x".into(),
                organ_shared::constants::EVENT_TYPE_CALENDAR_EVENT,
                &json!({ "name": "Gig", "date": "2024-05-17T19:30:00Z" }),
            )
            .await
            .unwrap();
        assert_eq!(event_id.as_str(), "$e1");
    }

    #[tokio::test]
    async fn missing_room_type_reads_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/_matrix/client/v3/rooms/!plain:x/state/directory.radical.room_type.v1/",
            ))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errcode": "M_NOT_FOUND",
                "error": "Event not found."
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/_matrix/client/v3/rooms/!cal:x/state/directory.radical.room_type.v1/",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "room_type": "calendar" })),
            )
            .mount(&server)
            .await;

        let client = logged_in(&server).await;
        assert_eq!(client.room_type(&"!plain:x".into()).await.unwrap(), None);
        assert_eq!(
            client.room_type(&"!cal:x".into()).await.unwrap(),
            Some(RoomType::Calendar)
        );
    }

    #[tokio::test]
    async fn sync_passes_since_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .and(query_param("since", "s1"))
            .and(query_param("timeout", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next_batch": "s2",
                "rooms": { "join": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = logged_in(&server).await;
        let sync = client.sync(Some("s1"), Duration::ZERO).await.unwrap();
        assert_eq!(sync.next_batch, "s2");
    }

    #[tokio::test]
    async fn messages_pages_backwards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!c:x/messages"))
            .and(query_param("dir", "b"))
            .and(query_param("from", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "start": "t1",
                "end": "t0",
                "chunk": [{ "type": "m.room.message", "event_id": "$m1", "content": {} }]
            })))
            .mount(&server)
            .await;

        let client = logged_in(&server).await;
        let page = client.messages(&"!c:x".into(), Some("t1"), 20).await.unwrap();
        assert_eq!(page.chunk.len(), 1);
        assert_eq!(page.end.as_deref(), Some("t0"));
    }
}
