//! Wire types of the Matrix client-server API, trimmed to the fields Organ reads.

use std::collections::HashMap;

use organ_shared::{EventId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub login_type: &'static str,
    pub identifier: UserIdentifier<'a>,
    pub password: &'a str,
    pub initial_device_display_name: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    pub id_type: &'static str,
    pub user: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WhoamiResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JoinedRoomsResponse {
    pub joined_rooms: Vec<RoomId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoomNameContent {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRoomRequest<'a> {
    pub name: &'a str,
    pub preset: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventIdResponse {
    pub event_id: EventId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// A timeline or state event as delivered by `/sync` and `/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    /// Target of an `m.room.redaction` in room versions before v11.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<EventId>,
    #[serde(default)]
    pub origin_server_ts: Option<u64>,
}

impl RawEvent {
    /// Target of a redaction, from the top level or (v11+) the content.
    pub fn redaction_target(&self) -> Option<EventId> {
        self.redacts.clone().or_else(|| {
            self.content
                .get("redacts")
                .and_then(Value::as_str)
                .map(EventId::from)
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: HashMap<RoomId, JoinedRoom>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub prev_batch: Option<String>,
}

/// Response of `GET /rooms/{roomId}/messages`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub chunk: Vec<RawEvent>,
    #[serde(default)]
    pub start: Option<String>,
    /// Absent once the start of the room has been reached.
    #[serde(default)]
    pub end: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn redaction_target_from_either_place() {
        let legacy: RawEvent = serde_json::from_value(json!({
            "type": "m.room.redaction",
            "event_id": "$r1",
            "redacts": "$e1",
            "content": {}
        }))
        .unwrap();
        assert_eq!(legacy.redaction_target(), Some(EventId::new("$e1")));

        let v11: RawEvent = serde_json::from_value(json!({
            "type": "m.room.redaction",
            "event_id": "$r2",
            "content": { "redacts": "$e2" }
        }))
        .unwrap();
        assert_eq!(v11.redaction_target(), Some(EventId::new("$e2")));
    }

    #[test]
    fn sparse_sync_parses() {
        let sync: SyncResponse = serde_json::from_value(json!({
            "next_batch": "s1",
            "rooms": { "join": { "!c:x": { "timeline": { "events": [] } } } }
        }))
        .unwrap();
        assert_eq!(sync.next_batch, "s1");
        assert!(sync.rooms.join.contains_key("!c:x"));
    }
}
