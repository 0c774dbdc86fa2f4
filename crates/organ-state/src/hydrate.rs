//! Rebuild a [`GlobalState`] snapshot from local storage.
//!
//! Storage is untrusted: every record goes through the validators in
//! `organ_shared::validate` and anything that fails is dropped with a warning.
//! Only a failing database stops hydration.

use std::collections::HashSet;

use organ_shared::validate::{validate_event, validate_owner, validate_room};
use organ_shared::{EventId, Room, RoomId, UserProfile};
use organ_store::{Database, StorageKey, StoreError};
use serde_json::Value;
use tracing::{info, warn};

use crate::state::GlobalState;

/// Read and validate the user profile and every persisted record reachable
/// from `matrixRoomIds`.
pub fn hydrate(db: &Database) -> Result<GlobalState, StoreError> {
    // The profile does not hang off `matrixRoomIds`.
    let mut state = GlobalState {
        user: load_user(db)?,
        ..GlobalState::default()
    };

    let room_ids = match db.get_room_ids() {
        Ok(Some(ids)) => ids,
        Ok(None) => {
            info!("No stored rooms, starting empty");
            return Ok(state);
        }
        Err(StoreError::Codec(e)) => {
            warn!(error = %e, "Stored room id set is corrupt, starting empty");
            return Ok(state);
        }
        Err(e) => return Err(e),
    };

    for room_id in &room_ids {
        let Some(value) = read_json(db, &StorageKey::Room(room_id.clone()))? else {
            continue;
        };
        match validate_room(room_id.as_str(), value) {
            Ok(Room::Calendar(cal)) => {
                state.calendars.insert(room_id.clone(), cal);
            }
            Ok(Room::Standard(room)) => {
                state.standard_rooms.insert(room_id.clone(), room);
            }
            Ok(Room::Event(room)) => {
                state.event_rooms.insert(room_id.clone(), room);
            }
            Err(e) => warn!(room = %room_id, error = %e, "Dropping invalid room record"),
        }
    }

    // Unreachable room records stay in `matrixRoomIds` so the next sync can
    // fill them in.
    state.matrix_room_ids = room_ids;

    load_events(db, &mut state)?;

    info!(
        calendars = state.calendars.len(),
        standard_rooms = state.standard_rooms.len(),
        event_rooms = state.event_rooms.len(),
        events = state.events.len(),
        "Hydrated state from storage"
    );
    Ok(state)
}

fn load_events(db: &Database, state: &mut GlobalState) -> Result<(), StoreError> {
    let indexed: Vec<(RoomId, EventId)> = state
        .calendars
        .iter()
        .flat_map(|(cal_id, cal)| cal.events.keys().map(move |e| (cal_id.clone(), e.clone())))
        .collect();

    let mut loaded = HashSet::new();
    for (calendar_id, event_id) in indexed {
        let Some(value) = read_json(db, &StorageKey::Event(event_id.clone()))? else {
            continue;
        };
        let event = match validate_event(event_id.as_str(), value) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %event_id, error = %e, "Dropping invalid event record");
                continue;
            }
        };
        if let Err(e) = validate_owner(&event, &calendar_id) {
            warn!(event = %event_id, error = %e, "Dropping event indexed under the wrong calendar");
            continue;
        }
        loaded.insert(event_id.clone());
        state.events.insert(event_id, event);
    }

    // Keep each calendar's index consistent with what was actually loaded.
    for calendar in state.calendars.values_mut() {
        calendar.events.retain(|event_id, _| loaded.contains(event_id));
    }
    Ok(())
}

fn load_user(db: &Database) -> Result<UserProfile, StoreError> {
    let Some(value) = read_json(db, &StorageKey::User)? else {
        return Ok(UserProfile::default());
    };
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        warn!(error = %e, "Stored user profile is invalid, ignoring it");
        UserProfile::default()
    }))
}

/// Fetch and parse a record.  Missing or unparseable records read as `None`.
fn read_json(db: &Database, key: &StorageKey) -> Result<Option<Value>, StoreError> {
    let Some(raw) = db.get_raw(key)? else {
        warn!(key = %key, "Record referenced but not stored");
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(key = %key, error = %e, "Record is not valid JSON");
            Ok(None)
        }
    }
}
