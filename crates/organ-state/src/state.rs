use std::collections::{HashMap, HashSet};

use organ_shared::{
    CalendarEvent, CalendarRoom, EventId, Room, RoomId, RootEventRoom, StandardRoom, UserProfile,
};

/// Everything the application knows, keyed by homeserver-assigned ids.
///
/// Also used as the snapshot handed to `Action::InitialiseState`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalState {
    pub user: UserProfile,
    pub calendars: HashMap<RoomId, CalendarRoom>,
    pub standard_rooms: HashMap<RoomId, StandardRoom>,
    pub event_rooms: HashMap<RoomId, RootEventRoom>,
    pub matrix_room_ids: HashSet<RoomId>,
    pub events: HashMap<EventId, CalendarEvent>,
}

impl GlobalState {
    /// Look up a room of any kind.
    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        if let Some(cal) = self.calendars.get(room_id) {
            return Some(Room::Calendar(cal.clone()));
        }
        if let Some(room) = self.standard_rooms.get(room_id) {
            return Some(Room::Standard(room.clone()));
        }
        self.event_rooms
            .get(room_id)
            .map(|room| Room::Event(room.clone()))
    }

    /// Ids of every room held in one of the three room mappings.
    pub fn room_ids_in_use(&self) -> impl Iterator<Item = &RoomId> {
        self.calendars
            .keys()
            .chain(self.standard_rooms.keys())
            .chain(self.event_rooms.keys())
    }
}
