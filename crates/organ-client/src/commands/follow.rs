use organ_shared::links::{classify_url, matrix_room_id, LinkKind};
use organ_shared::RoomId;
use tracing::info;

use super::calendar::promote_to_calendar;
use crate::error::ClientError;
use crate::state::SharedState;

/// Follow a calendar by link.
///
/// Only rooms already joined can be followed: a joined standard room is
/// promoted to a calendar.  iCalendar feeds are recognised but not supported.
pub fn follow(state: &SharedState, url: &str) -> Result<RoomId, ClientError> {
    match classify_url(url) {
        LinkKind::None => Err(ClientError::InvalidUrl(url.to_string())),
        LinkKind::Ical => Err(ClientError::Unsupported(url.to_string())),
        LinkKind::Matrix => {
            let room_id =
                matrix_room_id(url).ok_or_else(|| ClientError::InvalidUrl(url.to_string()))?;

            let (is_calendar, is_standard) = {
                let app = state.lock()?;
                let known = app.store.state();
                (
                    known.calendars.contains_key(&room_id),
                    known.standard_rooms.contains_key(&room_id),
                )
            };

            if is_calendar {
                return Err(ClientError::AlreadyFollowing(room_id));
            }
            if !is_standard {
                // TODO: join the room (and resolve aliases) instead of failing.
                return Err(ClientError::NotJoined(room_id));
            }

            promote_to_calendar(state, &room_id)?;
            info!(room = %room_id, "Following calendar");
            Ok(room_id)
        }
    }
}
