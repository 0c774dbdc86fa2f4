//! Calendar and event creation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use organ_net::SyncCommand;
use organ_shared::constants::{EVENT_TYPE_CALENDAR_EVENT, STATE_TYPE_ROOM_TYPE};
use organ_shared::protocol::{EventContent, RoomTypeContent};
use organ_shared::{CalendarRoom, EventId, RoomId, RoomType};
use organ_state::{Action, Outcome};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::request;
use crate::error::ClientError;
use crate::state::SharedState;

/// User input for a new calendar event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub name: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub description: String,
    /// Posted but hidden from followers until published.
    #[serde(default)]
    pub draft: bool,
}

/// Create a room, tag it as a calendar, and start tracking it.
pub async fn create_calendar(state: &SharedState, name: &str) -> Result<RoomId, ClientError> {
    let room_id = request(state, |reply| SyncCommand::CreateRoom {
        name: name.to_string(),
        reply,
    })
    .await?;

    let content = serde_json::to_value(RoomTypeContent {
        room_type: RoomType::Calendar,
    })?;
    request(state, |reply| SyncCommand::SendStateEvent {
        room_id: room_id.clone(),
        event_type: STATE_TYPE_ROOM_TYPE.to_string(),
        state_key: String::new(),
        content,
        reply,
    })
    .await?;

    let outcome = state
        .lock()?
        .dispatch(Action::SetMatrixCalendar(CalendarRoom::new(room_id.clone(), name)));
    if let Outcome::Skipped(skip) = outcome {
        return Err(ClientError::Rejected(skip));
    }

    info!(room = %room_id, name, "Created calendar");
    Ok(room_id)
}

/// Post an event into a calendar.
///
/// The event is not stored here: it enters the state when the homeserver
/// echoes it back through the sync bridge.
pub async fn create_event(
    state: &SharedState,
    calendar_id: &RoomId,
    draft: EventDraft,
) -> Result<EventId, ClientError> {
    let known = state.lock()?.store.state().calendars.contains_key(calendar_id);
    if !known {
        return Err(ClientError::UnknownCalendar(calendar_id.clone()));
    }

    let content = serde_json::to_value(EventContent {
        name: draft.name,
        date: draft.date,
        venue: draft.venue,
        description: draft.description,
        room_id: None,
        shared_event_ids: HashMap::new(),
        draft: draft.draft,
    })?;

    let event_id = request(state, |reply| SyncCommand::SendEvent {
        room_id: calendar_id.clone(),
        event_type: EVENT_TYPE_CALENDAR_EVENT.to_string(),
        content,
        reply,
    })
    .await?;

    info!(calendar = %calendar_id, event = %event_id, "Posted event");
    Ok(event_id)
}

/// Treat a joined standard room as a calendar.
///
/// Setting the calendar also takes the room out of the standard rooms.
pub fn promote_to_calendar(state: &SharedState, room_id: &RoomId) -> Result<(), ClientError> {
    let mut app = state.lock()?;
    let Some(room) = app.store.state().standard_rooms.get(room_id).cloned() else {
        return Err(ClientError::NotJoined(room_id.clone()));
    };

    let outcome = app.dispatch(Action::SetMatrixCalendar(CalendarRoom::new(
        room.room_id.clone(),
        room.room_name,
    )));
    if let Outcome::Skipped(skip) = outcome {
        return Err(ClientError::Rejected(skip));
    }

    info!(room = %room_id, "Promoted room to calendar");
    Ok(())
}
