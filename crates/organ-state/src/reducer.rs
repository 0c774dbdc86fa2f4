//! The domain reducer.
//!
//! `reduce` is the only code path that mutates [`GlobalState`].  It performs
//! no I/O beyond tracing and keeps these invariants:
//!
//! - every stored event is owned by a calendar in `calendars`;
//! - `matrix_room_ids` contains every key of the three room mappings;
//! - a room id appears in at most one room mapping;
//! - every calendar carries the `calendar` room-type tag.
//!
//! Later dispatches for the same key replace earlier ones.

use std::collections::HashSet;

use organ_shared::{
    CalendarEvent, CalendarRoom, EventId, RoomId, RoomType, RootEventRoom, StandardRoom,
};
use organ_store::StorageKey;
use tracing::{debug, info, warn};

use crate::action::{Action, Changes, Outcome, Skip};
use crate::state::GlobalState;

pub fn reduce(state: &mut GlobalState, action: Action) -> Outcome {
    match action {
        Action::InitialiseState(snapshot) => initialise(state, *snapshot),
        Action::SetUser(user) => {
            state.user = user;
            Outcome::Applied(Changes {
                user: true,
                ..Changes::default()
            })
        }
        Action::SetMatrixRooms(room_ids) => set_matrix_rooms(state, room_ids),
        Action::SetMatrixCalendar(calendar) => set_calendar(state, calendar),
        Action::DeleteMatrixCalendar { room_id } => {
            let mut changes = Changes::default();
            if remove_calendar(state, &room_id, &mut changes) {
                changes.removed.push(StorageKey::Room(room_id));
                Outcome::Applied(changes)
            } else {
                unknown_room(room_id)
            }
        }
        Action::SetMatrixStandardRoom(room) => set_standard_room(state, room),
        Action::DeleteMatrixStandardRoom { room_id } => {
            if state.standard_rooms.remove(&room_id).is_some() {
                info!(room = %room_id, "Deleted standard room");
                Outcome::Applied(Changes {
                    removed: vec![StorageKey::Room(room_id)],
                    ..Changes::default()
                })
            } else {
                unknown_room(room_id)
            }
        }
        Action::SetMatrixEventRoom(room) => set_event_room(state, room),
        Action::DeleteMatrixEventRoom { room_id } => {
            if state.event_rooms.remove(&room_id).is_some() {
                info!(room = %room_id, "Deleted event room");
                Outcome::Applied(Changes {
                    removed: vec![StorageKey::Room(room_id)],
                    ..Changes::default()
                })
            } else {
                unknown_room(room_id)
            }
        }
        Action::SetMatrixEvent(event) => set_event(state, event),
        Action::DeleteMatrixEvent { event_id } => delete_event(state, event_id),
    }
}

fn unknown_room(room_id: RoomId) -> Outcome {
    debug!(room = %room_id, "Room not known, nothing to delete");
    Outcome::Skipped(Skip::UnknownRoom { room_id })
}

fn initialise(state: &mut GlobalState, mut snapshot: GlobalState) -> Outcome {
    snapshot.calendars.retain(|id, calendar| {
        let tagged = calendar.room_type == Some(RoomType::Calendar);
        if !tagged {
            warn!(
                room = %id,
                room_type = ?calendar.room_type,
                "Dropping calendar without the calendar room type"
            );
        }
        tagged
    });

    // A room belongs to one mapping: calendars win over event rooms, which
    // win over standard rooms.
    snapshot
        .event_rooms
        .retain(|id, _| !snapshot.calendars.contains_key(id));
    snapshot.standard_rooms.retain(|id, _| {
        !snapshot.calendars.contains_key(id) && !snapshot.event_rooms.contains_key(id)
    });

    snapshot.events.retain(|id, event| {
        let owned = snapshot.calendars.contains_key(&event.root_event_room_id);
        if !owned {
            warn!(
                event = %id,
                calendar = %event.root_event_room_id,
                "Dropping event whose calendar is not loaded"
            );
        }
        owned
    });

    let in_use: Vec<RoomId> = snapshot.room_ids_in_use().cloned().collect();
    snapshot.matrix_room_ids.extend(in_use);

    info!(
        calendars = snapshot.calendars.len(),
        standard_rooms = snapshot.standard_rooms.len(),
        event_rooms = snapshot.event_rooms.len(),
        events = snapshot.events.len(),
        "Initialised state"
    );

    *state = snapshot;
    Outcome::Applied(Changes::default())
}

fn set_matrix_rooms(state: &mut GlobalState, mut room_ids: HashSet<RoomId>) -> Outcome {
    info!(count = room_ids.len(), "Setting matrix rooms");
    room_ids.extend(state.room_ids_in_use().cloned());
    state.matrix_room_ids = room_ids;
    Outcome::Applied(Changes {
        room_ids: true,
        ..Changes::default()
    })
}

/// Add `room_id` to the known-room set, recording whether it was new.
fn track_room(state: &mut GlobalState, room_id: &RoomId, changes: &mut Changes) {
    if state.matrix_room_ids.insert(room_id.clone()) {
        changes.room_ids = true;
    }
}

fn set_calendar(state: &mut GlobalState, mut calendar: CalendarRoom) -> Outcome {
    if calendar.room_type != Some(RoomType::Calendar) {
        warn!(
            room = %calendar.room_id,
            room_type = ?calendar.room_type,
            "Ignoring calendar upsert without the calendar room type"
        );
        return Outcome::Skipped(Skip::RoomTypeMismatch {
            room_id: calendar.room_id,
            found: calendar.room_type,
        });
    }

    info!(room = %calendar.room_id, name = %calendar.room_name, "Setting calendar");

    let room_id = calendar.room_id.clone();
    let mut changes = Changes::default();

    if state.standard_rooms.remove(&room_id).is_some() {
        debug!(room = %room_id, "Standard room became a calendar");
    }
    if state.event_rooms.remove(&room_id).is_some() {
        debug!(room = %room_id, "Event room became a calendar");
    }

    // Events already attached stay attached.
    if let Some(existing) = state.calendars.get(&room_id) {
        for (event_id, origin) in &existing.events {
            if state.events.contains_key(event_id) {
                calendar
                    .events
                    .entry(event_id.clone())
                    .or_insert_with(|| origin.clone());
            }
        }
    }

    track_room(state, &room_id, &mut changes);
    state.calendars.insert(room_id.clone(), calendar);
    changes.rooms.insert(room_id);
    Outcome::Applied(changes)
}

/// Remove a calendar and every event it owns.  Returns `false` if unknown.
fn remove_calendar(state: &mut GlobalState, room_id: &RoomId, changes: &mut Changes) -> bool {
    if state.calendars.remove(room_id).is_none() {
        return false;
    }

    let owned: Vec<EventId> = state
        .events
        .iter()
        .filter(|(_, event)| &event.root_event_room_id == room_id)
        .map(|(id, _)| id.clone())
        .collect();

    for event_id in owned {
        state.events.remove(&event_id);
        changes.removed.push(StorageKey::Event(event_id));
    }

    info!(room = %room_id, "Deleted calendar");
    true
}

fn set_standard_room(state: &mut GlobalState, room: StandardRoom) -> Outcome {
    info!(room = %room.room_id, name = %room.room_name, "Setting standard room");

    let room_id = room.room_id.clone();
    let mut changes = Changes::default();

    remove_calendar(state, &room_id, &mut changes);
    state.event_rooms.remove(&room_id);

    track_room(state, &room_id, &mut changes);
    state.standard_rooms.insert(room_id.clone(), room);
    changes.rooms.insert(room_id);
    Outcome::Applied(changes)
}

fn set_event_room(state: &mut GlobalState, room: RootEventRoom) -> Outcome {
    info!(
        room = %room.room_id,
        root_event = %room.root_event_id,
        "Setting event room"
    );

    let room_id = room.room_id.clone();
    let mut changes = Changes::default();

    remove_calendar(state, &room_id, &mut changes);
    state.standard_rooms.remove(&room_id);

    track_room(state, &room_id, &mut changes);
    state.event_rooms.insert(room_id.clone(), room);
    changes.rooms.insert(room_id);
    Outcome::Applied(changes)
}

fn set_event(state: &mut GlobalState, event: CalendarEvent) -> Outcome {
    let owner = event.root_event_room_id.clone();

    if !state.calendars.contains_key(&owner) {
        info!(
            event = %event.event_id,
            calendar = %owner,
            "Calendar not found, event not stored"
        );
        return Outcome::Skipped(Skip::UnknownCalendar {
            event_id: event.event_id,
            calendar_id: owner,
        });
    }

    info!(event = %event.event_id, name = %event.name, "Setting event");

    let mut changes = Changes::default();

    // Moving between calendars: unindex from the previous owner.
    let previous_owner = state
        .events
        .get(&event.event_id)
        .map(|previous| previous.root_event_room_id.clone())
        .filter(|previous| *previous != owner);
    if let Some(previous_owner) = previous_owner {
        if let Some(previous) = state.calendars.get_mut(&previous_owner) {
            previous.events.remove(&event.event_id);
            changes.rooms.insert(previous_owner);
        }
    }

    if let Some(calendar) = state.calendars.get_mut(&owner) {
        calendar
            .events
            .insert(event.event_id.clone(), event.origin().clone());
    }
    changes.rooms.insert(owner);
    changes.events.insert(event.event_id.clone());
    state.events.insert(event.event_id.clone(), event);
    Outcome::Applied(changes)
}

fn delete_event(state: &mut GlobalState, event_id: EventId) -> Outcome {
    let Some(event) = state.events.remove(&event_id) else {
        debug!(event = %event_id, "Event not known, nothing to delete");
        return Outcome::Skipped(Skip::UnknownEvent { event_id });
    };

    info!(event = %event_id, "Deleted event");

    let mut changes = Changes::default();
    if let Some(calendar) = state.calendars.get_mut(&event.root_event_room_id) {
        calendar.events.remove(&event_id);
        changes.rooms.insert(event.root_event_room_id);
    }
    changes.removed.push(StorageKey::Event(event_id));
    Outcome::Applied(changes)
}
