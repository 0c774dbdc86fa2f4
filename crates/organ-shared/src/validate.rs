//! Structural checks applied to records read back from local storage.
//!
//! Each check returns `Ok(record)` or a [`ValidationError`] describing why the
//! record was rejected.  Nothing here panics on bad input.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{CalendarEvent, Room, RoomId, RoomType};

fn parse<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|source| ValidationError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Validate a persisted room record stored under `key`.
///
/// The `roomType` tag selects the expected shape: `"calendar"` and `"event"`
/// map to their room kinds, a missing or `null` tag to a standard room.
pub fn validate_room(key: &str, value: Value) -> Result<Room, ValidationError> {
    let tag = match value.get("roomType") {
        None | Some(Value::Null) => None,
        Some(Value::String(tag)) => match RoomType::from_tag(tag) {
            Some(room_type) => Some(room_type),
            None => {
                return Err(ValidationError::UnknownRoomType {
                    key: key.to_string(),
                    tag: tag.clone(),
                })
            }
        },
        Some(other) => {
            return Err(ValidationError::UnknownRoomType {
                key: key.to_string(),
                tag: other.to_string(),
            })
        }
    };

    let room = match tag {
        Some(RoomType::Calendar) => Room::Calendar(parse(key, value)?),
        Some(RoomType::Event) => Room::Event(parse(key, value)?),
        None => Room::Standard(parse(key, value)?),
    };

    if room.room_id().as_str() != key {
        return Err(ValidationError::KeyMismatch {
            key: key.to_string(),
            found: room.room_id().to_string(),
        });
    }

    Ok(room)
}

/// Validate a persisted calendar event stored under `key`.
pub fn validate_event(key: &str, value: Value) -> Result<CalendarEvent, ValidationError> {
    let event: CalendarEvent = parse(key, value)?;
    if event.event_id.as_str() != key {
        return Err(ValidationError::KeyMismatch {
            key: key.to_string(),
            found: event.event_id.to_string(),
        });
    }
    Ok(event)
}

/// Check that `event` belongs to `calendar_id`, the calendar whose index
/// referenced it.
pub fn validate_owner(event: &CalendarEvent, calendar_id: &RoomId) -> Result<(), ValidationError> {
    if &event.root_event_room_id == calendar_id {
        return Ok(());
    }
    Err(ValidationError::OrphanEvent {
        event_id: event.event_id.to_string(),
        calendar_id: calendar_id.to_string(),
        owner: event.root_event_room_id.to_string(),
    })
}
