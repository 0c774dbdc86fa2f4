use std::collections::HashSet;

use organ_shared::{
    CalendarEvent, CalendarRoom, EventId, RoomId, RoomType, RootEventRoom, StandardRoom,
    UserProfile,
};
use organ_store::StorageKey;

use crate::state::GlobalState;

/// A requested state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the whole state with a hydrated snapshot.
    InitialiseState(Box<GlobalState>),
    SetUser(UserProfile),
    /// Replace the known-room-id set.
    SetMatrixRooms(HashSet<RoomId>),
    SetMatrixCalendar(CalendarRoom),
    DeleteMatrixCalendar { room_id: RoomId },
    SetMatrixStandardRoom(StandardRoom),
    DeleteMatrixStandardRoom { room_id: RoomId },
    SetMatrixEventRoom(RootEventRoom),
    DeleteMatrixEventRoom { room_id: RoomId },
    SetMatrixEvent(CalendarEvent),
    DeleteMatrixEvent { event_id: EventId },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialiseState(_) => "INITIALISE_STATE",
            Self::SetUser(_) => "SET_USER",
            Self::SetMatrixRooms(_) => "SET_MATRIX_ROOMS",
            Self::SetMatrixCalendar(_) => "SET_MATRIX_CALENDAR",
            Self::DeleteMatrixCalendar { .. } => "DELETE_MATRIX_CALENDAR",
            Self::SetMatrixStandardRoom(_) => "SET_MATRIX_STANDARD_ROOM",
            Self::DeleteMatrixStandardRoom { .. } => "DELETE_MATRIX_STANDARD_ROOM",
            Self::SetMatrixEventRoom(_) => "SET_MATRIX_EVENT_ROOM",
            Self::DeleteMatrixEventRoom { .. } => "DELETE_MATRIX_EVENT_ROOM",
            Self::SetMatrixEvent(_) => "SET_MATRIX_EVENT",
            Self::DeleteMatrixEvent { .. } => "DELETE_MATRIX_EVENT",
        }
    }
}

/// What an applied action touched, so observers know what to write.
///
/// An empty `Changes` means the in-memory state changed but nothing needs
/// writing back (e.g. after hydration).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub user: bool,
    pub room_ids: bool,
    /// Rooms whose records must be (re)written.
    pub rooms: HashSet<RoomId>,
    /// Events whose records must be (re)written.
    pub events: HashSet<EventId>,
    /// Keys whose records must be deleted.
    pub removed: Vec<StorageKey>,
}

/// Why an action left the state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// `SetMatrixCalendar` carried a room-type tag other than `calendar`.
    RoomTypeMismatch {
        room_id: RoomId,
        found: Option<RoomType>,
    },
    /// The event's owning calendar is not known (yet).
    UnknownCalendar {
        event_id: EventId,
        calendar_id: RoomId,
    },
    UnknownRoom { room_id: RoomId },
    UnknownEvent { event_id: EventId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(Changes),
    Skipped(Skip),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn changes(&self) -> Option<&Changes> {
        match self {
            Self::Applied(changes) => Some(changes),
            Self::Skipped(_) => None,
        }
    }
}
