//! Background Matrix client task with tokio mpsc command/notification channels.
//!
//! The task owns a [`MatrixClient`].  While it holds a session it long-polls
//! `/sync` and reports sync-state transitions, the joined-room summary, and
//! every timeline event.  Requests from the application arrive as
//! [`SyncCommand`]s and answer on a oneshot channel.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use organ_shared::constants::{DEFAULT_HOMESERVER, DEFAULT_SYNC_TIMEOUT_MS, RETRY_DELAY_MS};
use organ_shared::{EventId, RoomId, RoomType};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::{RawEvent, SyncResponse};
use crate::error::NetError;
use crate::matrix::{MatrixClient, Session};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, NetError>>;

/// Commands sent *into* the client task.
#[derive(Debug)]
pub enum SyncCommand {
    /// Password login.  The task adopts the session and starts syncing.
    Login {
        user: String,
        password: String,
        reply: Reply<Session>,
    },
    CreateRoom {
        name: String,
        reply: Reply<RoomId>,
    },
    SendEvent {
        room_id: RoomId,
        event_type: String,
        content: Value,
        reply: Reply<EventId>,
    },
    SendStateEvent {
        room_id: RoomId,
        event_type: String,
        state_key: String,
        content: Value,
        reply: Reply<EventId>,
    },
    /// Page one batch of older events of a room.  Replies with the number of
    /// events delivered; `0` once the start of the room is reached.
    Backfill {
        room_id: RoomId,
        limit: u32,
        reply: Reply<usize>,
    },
    /// Stop syncing and end the task.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The first sync completed.
    Prepared,
    Syncing,
    /// The last sync failed; the task keeps retrying.
    Error(String),
    Stopped,
}

/// What the task knows about a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub name: String,
    pub room_type: Option<RoomType>,
    pub root_event_id: Option<EventId>,
}

/// Notifications sent *from* the client task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotification {
    SyncState(SyncState),
    /// Every joined room, sent after the first sync and whenever a room is
    /// joined.
    Rooms(Vec<RoomSummary>),
    /// One timeline event.  `live` is `false` for backfilled history.
    Timeline {
        room_id: RoomId,
        event: RawEvent,
        live: bool,
    },
}

/// Configuration for spawning the client task.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub homeserver: String,
    /// Long-poll timeout passed to `/sync`.
    pub timeout: Duration,
    /// Pause before syncing again after a failed sync.
    pub error_pause: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            homeserver: DEFAULT_HOMESERVER.to_string(),
            timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            error_pause: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

/// Spawn the client task.
///
/// Returns `(command_tx, notification_rx)`.  Without a session the task only
/// answers commands until a `Login` succeeds.
pub fn spawn_client(
    config: SyncConfig,
    session: Option<Session>,
) -> Result<(mpsc::Sender<SyncCommand>, mpsc::Receiver<SyncNotification>), NetError> {
    let mut client = MatrixClient::new(&config.homeserver)?;
    if let Some(session) = session {
        info!(user = %session.user_id, "Client starting with stored session");
        client = client.with_session(session);
    }

    let (cmd_tx, cmd_rx) = mpsc::channel::<SyncCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SyncNotification>(256);

    tokio::spawn(async move {
        let mut task = ClientTask {
            client,
            config,
            notif_tx,
            state: None,
            since: None,
            failed: false,
            rooms: HashMap::new(),
            history: HashMap::new(),
        };
        task.run(cmd_rx).await;
    });

    Ok((cmd_tx, notif_rx))
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct ClientTask {
    client: MatrixClient,
    config: SyncConfig,
    notif_tx: mpsc::Sender<SyncNotification>,
    /// Last state reported.
    state: Option<SyncState>,
    /// `next_batch` of the last successful sync.
    since: Option<String>,
    failed: bool,
    rooms: HashMap<RoomId, RoomSummary>,
    /// Backwards pagination token per room; `None` once history is exhausted.
    history: HashMap<RoomId, Option<String>>,
}

impl ClientTask {
    async fn run(&mut self, mut cmd_rx: mpsc::Receiver<SyncCommand>) {
        loop {
            let syncing = self.client.session().is_some();
            let client = self.client.clone();
            let since = self.since.clone();
            let timeout = self.config.timeout;
            let pause = if self.failed {
                self.config.error_pause
            } else {
                Duration::ZERO
            };

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::Shutdown) => {
                            info!("Client shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("Command channel closed, stopping client");
                            break;
                        }
                    }
                }

                result = async move {
                    tokio::time::sleep(pause).await;
                    client.sync(since.as_deref(), timeout).await
                }, if syncing => {
                    match result {
                        Ok(response) => self.on_sync(response).await,
                        Err(e) => {
                            warn!(error = %e, "Sync failed");
                            self.failed = true;
                            self.set_state(SyncState::Error(e.to_string())).await;
                        }
                    }
                }
            }
        }

        self.set_state(SyncState::Stopped).await;
        info!("Client task terminated");
    }

    async fn notify(&self, notification: SyncNotification) {
        let _ = self.notif_tx.send(notification).await;
    }

    async fn set_state(&mut self, state: SyncState) {
        if self.state.as_ref() == Some(&state) {
            return;
        }
        debug!(state = ?state, "Sync state changed");
        self.state = Some(state.clone());
        self.notify(SyncNotification::SyncState(state)).await;
    }

    async fn handle_command(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::Login {
                user,
                password,
                reply,
            } => {
                let result = self.client.login(&user, &password).await;
                if result.is_ok() {
                    self.since = None;
                    self.failed = false;
                    self.rooms.clear();
                    self.history.clear();
                }
                let _ = reply.send(result);
            }
            SyncCommand::CreateRoom { name, reply } => {
                let _ = reply.send(self.client.create_room(&name).await);
            }
            SyncCommand::SendEvent {
                room_id,
                event_type,
                content,
                reply,
            } => {
                let result = self.client.send_event(&room_id, &event_type, &content).await;
                let _ = reply.send(result);
            }
            SyncCommand::SendStateEvent {
                room_id,
                event_type,
                state_key,
                content,
                reply,
            } => {
                let result = self
                    .client
                    .send_state_event(&room_id, &event_type, &state_key, &content)
                    .await;
                let _ = reply.send(result);
            }
            SyncCommand::Backfill {
                room_id,
                limit,
                reply,
            } => {
                let _ = reply.send(self.backfill(room_id, limit).await);
            }
            SyncCommand::Shutdown => {}
        }
    }

    async fn backfill(&mut self, room_id: RoomId, limit: u32) -> Result<usize, NetError> {
        let from = match self.history.get(&room_id) {
            Some(None) => {
                debug!(room = %room_id, "History exhausted");
                return Ok(0);
            }
            Some(Some(token)) => Some(token.clone()),
            None => None,
        };

        let page = self.client.messages(&room_id, from.as_deref(), limit).await?;
        let count = page.chunk.len();
        debug!(room = %room_id, count, "Backfilled events");

        self.history.insert(room_id.clone(), page.end);
        for event in page.chunk {
            self.notify(SyncNotification::Timeline {
                room_id: room_id.clone(),
                event,
                live: false,
            })
            .await;
        }
        Ok(count)
    }

    async fn on_sync(&mut self, response: SyncResponse) {
        let first = self.since.is_none();
        self.failed = false;

        let mut joined: HashSet<RoomId> = response.rooms.join.keys().cloned().collect();
        if first {
            match self.client.joined_rooms().await {
                Ok(rooms) => joined.extend(rooms),
                Err(e) => warn!(error = %e, "Failed to list joined rooms"),
            }
        }

        if first {
            self.set_state(SyncState::Prepared).await;
        } else {
            self.set_state(SyncState::Syncing).await;
        }

        let new_rooms: Vec<RoomId> = joined
            .into_iter()
            .filter(|id| !self.rooms.contains_key(id))
            .collect();
        if first || !new_rooms.is_empty() {
            let summaries = join_all(new_rooms.iter().map(|id| summarize(&self.client, id))).await;
            for summary in summaries {
                self.rooms.insert(summary.room_id.clone(), summary);
            }
            let mut all: Vec<RoomSummary> = self.rooms.values().cloned().collect();
            all.sort_by(|a, b| a.room_id.cmp(&b.room_id));
            info!(rooms = all.len(), "Joined rooms updated");
            self.notify(SyncNotification::Rooms(all)).await;
        }

        for (room_id, room) in response.rooms.join {
            if let Some(prev_batch) = room.timeline.prev_batch {
                self.history
                    .entry(room_id.clone())
                    .or_insert(Some(prev_batch));
            }
            for event in room.timeline.events {
                self.notify(SyncNotification::Timeline {
                    room_id: room_id.clone(),
                    event,
                    live: true,
                })
                .await;
            }
        }

        self.since = Some(response.next_batch);
    }
}

/// Read name and Organ room-type state of a room.  Lookup failures degrade to
/// an untagged room named after its id.
async fn summarize(client: &MatrixClient, room_id: &RoomId) -> RoomSummary {
    let name = match client.room_name(room_id).await {
        Ok(name) => name,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Failed to read room name");
            None
        }
    };
    let room_type = match client.room_type(room_id).await {
        Ok(room_type) => room_type,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Failed to read room type");
            None
        }
    };
    let root_event_id = if room_type == Some(RoomType::Event) {
        client.root_event_id(room_id).await.unwrap_or_else(|e| {
            warn!(room = %room_id, error = %e, "Failed to read root event id");
            None
        })
    } else {
        None
    };

    RoomSummary {
        room_id: room_id.clone(),
        name: name.unwrap_or_else(|| room_id.to_string()),
        room_type,
        root_event_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            user_id: "@me:x".into(),
            access_token: "token".into(),
            device_id: None,
        }
    }

    fn config(server: &MockServer) -> SyncConfig {
        SyncConfig {
            homeserver: server.uri(),
            timeout: Duration::ZERO,
            error_pause: Duration::from_millis(50),
        }
    }

    async fn next(rx: &mut mpsc::Receiver<SyncNotification>) -> SyncNotification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("notification in time")
            .expect("channel open")
    }

    /// A sync that never answers within the test.
    async fn mount_idle_sync(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "next_batch": "idle" }))
                    .set_delay(Duration::from_secs(60)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn first_sync_reports_rooms_then_timeline() {
        let server = MockServer::start().await;

        // Registered first so it wins over the initial-sync mock.
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .and(query_param("since", "s1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "next_batch": "s1" }))
                    .set_delay(Duration::from_secs(60)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next_batch": "s1",
                "rooms": { "join": { "!c:x": { "timeline": {
                    "prev_batch": "p0",
                    "events": [{
                        "type": "directory.radical.event.v1",
                        "event_id": "$e1",
                        "sender": "@me:x",
                        "content": { "name": "Gig", "date": "2024-05-17T19:30:00Z" }
                    }]
                } } } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "joined_rooms": ["!c:x"] })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!c:x/state/m.room.name/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Gigs" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/_matrix/client/v3/rooms/!c:x/state/directory.radical.room_type.v1/",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "room_type": "calendar" })),
            )
            .mount(&server)
            .await;

        let (_cmd_tx, mut rx) = spawn_client(config(&server), Some(session())).unwrap();

        assert_eq!(next(&mut rx).await, SyncNotification::SyncState(SyncState::Prepared));
        assert_eq!(
            next(&mut rx).await,
            SyncNotification::Rooms(vec![RoomSummary {
                room_id: "!c:x".into(),
                name: "Gigs".into(),
                room_type: Some(RoomType::Calendar),
                root_event_id: None,
            }])
        );
        match next(&mut rx).await {
            SyncNotification::Timeline {
                room_id,
                event,
                live,
            } => {
                assert_eq!(room_id.as_str(), "!c:x");
                assert_eq!(event.event_id, Some(EventId::new("$e1")));
                assert!(live);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backfill_delivers_history_as_not_live() {
        let server = MockServer::start().await;
        mount_idle_sync(&server).await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!c:x/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "start": "t1",
                "chunk": [
                    { "type": "m.room.message", "event_id": "$m2", "content": {} },
                    { "type": "m.room.message", "event_id": "$m1", "content": {} }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (cmd_tx, mut rx) = spawn_client(config(&server), Some(session())).unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(SyncCommand::Backfill {
                room_id: "!c:x".into(),
                limit: 20,
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), 2);

        for _ in 0..2 {
            match next(&mut rx).await {
                SyncNotification::Timeline { live, .. } => assert!(!live),
                other => panic!("unexpected notification: {other:?}"),
            }
        }

        // No `end` token: the start of the room was reached.
        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(SyncCommand::Backfill {
                room_id: "!c:x".into(),
                limit: 20,
                reply: reply_tx,
            })
            .await
            .unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_sync_reports_error_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "errcode": "M_UNKNOWN_TOKEN",
                "error": "Unknown token"
            })))
            .mount(&server)
            .await;

        let (_cmd_tx, mut rx) = spawn_client(config(&server), Some(session())).unwrap();
        match next(&mut rx).await {
            SyncNotification::SyncState(SyncState::Error(message)) => {
                assert!(message.contains("M_UNKNOWN_TOKEN"));
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_reports_stopped_and_closes() {
        let (cmd_tx, mut rx) = spawn_client(SyncConfig::default(), None).unwrap();
        cmd_tx.send(SyncCommand::Shutdown).await.unwrap();

        assert_eq!(next(&mut rx).await, SyncNotification::SyncState(SyncState::Stopped));
        assert!(rx.recv().await.is_none());
    }
}
