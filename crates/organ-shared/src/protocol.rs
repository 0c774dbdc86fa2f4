//! Payloads of the custom Matrix events Organ reads and writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CalendarEvent, EventId, RoomId, RoomType};

/// Content of a `directory.radical.event.v1` timeline event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventContent {
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub description: String,
    /// Owning calendar, when the event was posted outside of it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub shared_event_ids: HashMap<RoomId, EventId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub draft: bool,
}

impl EventContent {
    /// Build the stored event for a timeline event received in `arrived_in`.
    pub fn into_event(self, event_id: EventId, arrived_in: RoomId) -> CalendarEvent {
        let (root_event_room_id, origin_room_id) = match self.room_id {
            Some(owner) if owner != arrived_in => (owner, Some(arrived_in)),
            _ => (arrived_in, None),
        };

        CalendarEvent {
            event_id,
            name: self.name,
            date: self.date,
            venue: self.venue,
            description: self.description,
            root_event_room_id,
            origin_room_id,
            shared_event_ids: self.shared_event_ids,
            draft: self.draft,
        }
    }
}

/// Content of the room-type state event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomTypeContent {
    pub room_type: RoomType,
}

/// Content of the root-event-id state event of an event room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootEventIdContent {
    pub root_event_id: EventId,
}
