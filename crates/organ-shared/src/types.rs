use std::borrow::Borrow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::tagged_map;

// Matrix room id, e.g. `!abc:matrix.org`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoomId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// Matrix event id, e.g. `$xyz`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EventId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Value of the `roomType` tag.  Standard rooms carry no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Calendar,
    Event,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Event => "event",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "calendar" => Some(Self::Calendar),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// A joined room with no calendar semantics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StandardRoom {
    pub room_id: RoomId,
    pub room_name: String,
}

/// A room whose timeline carries calendar events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarRoom {
    pub room_id: RoomId,
    pub room_name: String,
    /// Must be `Some(RoomType::Calendar)` for the room to be accepted.
    pub room_type: Option<RoomType>,
    /// Event index: every attached event id and the room it was posted in.
    #[serde(default, with = "tagged_map")]
    pub events: HashMap<EventId, RoomId>,
}

impl CalendarRoom {
    /// A calendar with an empty index, filled incrementally as events arrive.
    pub fn new(room_id: RoomId, room_name: impl Into<String>) -> Self {
        Self {
            room_id,
            room_name: room_name.into(),
            room_type: Some(RoomType::Calendar),
            events: HashMap::new(),
        }
    }
}

/// A room dedicated to one authoritative event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RootEventRoom {
    pub room_id: RoomId,
    pub room_name: String,
    pub room_type: Option<RoomType>,
    pub root_event_id: EventId,
}

impl RootEventRoom {
    pub fn new(room_id: RoomId, room_name: impl Into<String>, root_event_id: EventId) -> Self {
        Self {
            room_id,
            room_name: room_name.into(),
            room_type: Some(RoomType::Event),
            root_event_id,
        }
    }
}

/// Any persisted room record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Room {
    Standard(StandardRoom),
    Calendar(CalendarRoom),
    Event(RootEventRoom),
}

impl Room {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Standard(r) => &r.room_id,
            Self::Calendar(r) => &r.room_id,
            Self::Event(r) => &r.room_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A calendar entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub event_id: EventId,
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub description: String,
    /// The calendar that owns this event.
    pub root_event_room_id: RoomId,
    /// The room whose timeline carried the event, when it differs from the owner.
    #[serde(default)]
    pub origin_room_id: Option<RoomId>,
    /// Calendar id -> id of the shared copy posted into that calendar.
    #[serde(default, with = "tagged_map")]
    pub shared_event_ids: HashMap<RoomId, EventId>,
    #[serde(default)]
    pub draft: bool,
}

impl CalendarEvent {
    pub fn origin(&self) -> &RoomId {
        self.origin_room_id
            .as_ref()
            .unwrap_or(&self.root_event_room_id)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub homeserver: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_type_tags() {
        assert_eq!(RoomType::from_tag("calendar"), Some(RoomType::Calendar));
        assert_eq!(RoomType::from_tag("event"), Some(RoomType::Event));
        assert_eq!(RoomType::from_tag("Calendar"), None);
        assert_eq!(
            serde_json::to_value(RoomType::Calendar).unwrap(),
            serde_json::json!("calendar")
        );
    }

    #[test]
    fn origin_falls_back_to_owner() {
        let mut event = CalendarEvent {
            event_id: "$e1".into(),
            name: "Gig".into(),
            date: Utc::now(),
            venue: String::new(),
            description: String::new(),
            root_event_room_id: "!cal:x".into(),
            origin_room_id: None,
            shared_event_ids: HashMap::new(),
            draft: false,
        };
        assert_eq!(event.origin().as_str(), "!cal:x");

        event.origin_room_id = Some("!other:x".into());
        assert_eq!(event.origin().as_str(), "!other:x");
    }

    #[test]
    fn calendar_room_json_shape() {
        let mut cal = CalendarRoom::new("!cal:x".into(), "Gigs");
        cal.events.insert("$e1".into(), "!cal:x".into());

        let value = serde_json::to_value(&cal).unwrap();
        assert_eq!(value["roomId"], "!cal:x");
        assert_eq!(value["roomType"], "calendar");
        assert_eq!(value["events"]["dataType"], "Map");
        assert_eq!(value["events"]["value"][0][0], "$e1");
    }
}
