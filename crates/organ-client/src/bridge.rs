//! Translates client-task notifications into state-store dispatches.

use std::collections::HashSet;

use organ_net::{RawEvent, RoomSummary, SyncNotification};
use organ_shared::constants::{EVENT_TYPE_CALENDAR_EVENT, EVENT_TYPE_REDACTION};
use organ_shared::protocol::EventContent;
use organ_shared::{CalendarRoom, RoomId, RoomType, RootEventRoom, StandardRoom};
use organ_state::{Action, Store};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::state::{AppState, SharedState};

/// Start a notification loop on `notif_rx` and make it the active bridge.
///
/// The previous loop, if any, is aborted: notifications from a replaced
/// client task are never applied.
pub fn attach(
    state: &SharedState,
    notif_rx: mpsc::Receiver<SyncNotification>,
) -> Result<(), ClientError> {
    let task = tokio::spawn(notification_loop(state.clone(), notif_rx));

    let mut guard = state.lock()?;
    if let Some(previous) = guard.bridge_task.replace(task) {
        debug!("Detaching previous sync bridge");
        previous.abort();
    }
    Ok(())
}

async fn notification_loop(state: SharedState, mut notif_rx: mpsc::Receiver<SyncNotification>) {
    info!("Sync bridge started");

    while let Some(notification) = notif_rx.recv().await {
        let Ok(mut guard) = state.lock() else {
            warn!("State lock poisoned, stopping sync bridge");
            break;
        };
        handle_notification(&mut guard, notification);
    }

    info!("Sync bridge stopped");
}

pub fn handle_notification(app: &mut AppState, notification: SyncNotification) {
    match notification {
        SyncNotification::SyncState(sync_state) => {
            info!(state = ?sync_state, "Sync state");
            app.sync_state = Some(sync_state);
        }
        SyncNotification::Rooms(summaries) => on_rooms(&mut app.store, summaries),
        SyncNotification::Timeline {
            room_id,
            event,
            live,
        } => on_timeline(&mut app.store, room_id, event, live),
    }
}

fn on_rooms(store: &mut Store, summaries: Vec<RoomSummary>) {
    if summaries.is_empty() {
        return;
    }

    let room_ids: HashSet<RoomId> = summaries.iter().map(|s| s.room_id.clone()).collect();
    store.dispatch(Action::SetMatrixRooms(room_ids));

    for summary in summaries {
        let is_calendar = store.state().calendars.contains_key(&summary.room_id);
        match (summary.room_type, summary.root_event_id) {
            (Some(RoomType::Calendar), _) => {
                if is_calendar {
                    continue;
                }
                // Events are attached incrementally as the timeline arrives.
                store.dispatch(Action::SetMatrixCalendar(CalendarRoom::new(
                    summary.room_id,
                    summary.name,
                )));
            }
            (Some(RoomType::Event), Some(root_event_id)) => {
                store.dispatch(Action::SetMatrixEventRoom(RootEventRoom::new(
                    summary.room_id,
                    summary.name,
                    root_event_id,
                )));
            }
            (Some(RoomType::Event), None) => {
                warn!(room = %summary.room_id, "Event room without a root event id, skipping");
            }
            _ if is_calendar => {
                // Calendars promoted locally carry no tag on the homeserver.
                debug!(room = %summary.room_id, "Keeping untagged calendar");
            }
            _ => {
                store.dispatch(Action::SetMatrixStandardRoom(StandardRoom {
                    room_id: summary.room_id,
                    room_name: summary.name,
                }));
            }
        }
    }
}

fn on_timeline(store: &mut Store, room_id: RoomId, event: RawEvent, live: bool) {
    if !live {
        debug!(room = %room_id, "Ignoring backfilled event");
        return;
    }

    match event.event_type.as_str() {
        EVENT_TYPE_CALENDAR_EVENT => {
            let Some(event_id) = event.event_id else {
                warn!(room = %room_id, "Calendar event without an event id");
                return;
            };
            let content: EventContent = match serde_json::from_value(event.content) {
                Ok(content) => content,
                Err(e) => {
                    warn!(
                        room = %room_id,
                        event = %event_id,
                        error = %e,
                        "Malformed calendar event"
                    );
                    return;
                }
            };
            debug!(room = %room_id, event = %event_id, sender = ?event.sender, "Calendar event");
            store.dispatch(Action::SetMatrixEvent(content.into_event(event_id, room_id)));
        }
        EVENT_TYPE_REDACTION => {
            let Some(target) = event.redaction_target() else {
                return;
            };
            if store.state().events.contains_key(&target) {
                store.dispatch(Action::DeleteMatrixEvent { event_id: target });
            }
        }
        other => debug!(room = %room_id, event_type = other, "Ignoring event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use organ_net::SyncState;
    use organ_shared::EventId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::config::ClientConfig;

    fn app() -> AppState {
        AppState::new(ClientConfig::default(), Store::new())
    }

    fn summary(id: &str, room_type: Option<RoomType>) -> RoomSummary {
        RoomSummary {
            room_id: id.into(),
            name: format!("Room {id}"),
            room_type,
            root_event_id: None,
        }
    }

    fn calendar_event(id: &str, content: serde_json::Value) -> RawEvent {
        RawEvent {
            event_type: EVENT_TYPE_CALENDAR_EVENT.into(),
            event_id: Some(EventId::new(id)),
            sender: Some("@me:x".into()),
            content,
            state_key: None,
            redacts: None,
            origin_server_ts: None,
        }
    }

    fn gig() -> serde_json::Value {
        json!({ "name": "Gig", "date": "2024-05-17T19:30:00Z", "venue": "Hall" })
    }

    fn timeline(room: &str, event: RawEvent, live: bool) -> SyncNotification {
        SyncNotification::Timeline {
            room_id: room.into(),
            event,
            live,
        }
    }

    #[test]
    fn rooms_are_classified_by_type() {
        let mut app = app();
        let mut event_room = summary("!e:x", Some(RoomType::Event));
        event_room.root_event_id = Some("$root".into());

        handle_notification(
            &mut app,
            SyncNotification::Rooms(vec![
                summary("!c:x", Some(RoomType::Calendar)),
                summary("!s:x", None),
                event_room,
            ]),
        );

        let state = app.store.state();
        assert!(state.calendars.contains_key("!c:x"));
        assert!(state.standard_rooms.contains_key("!s:x"));
        assert_eq!(state.event_rooms["!e:x"].root_event_id.as_str(), "$root");
        assert_eq!(state.matrix_room_ids.len(), 3);
    }

    #[test]
    fn live_calendar_event_is_stored() {
        let mut app = app();
        handle_notification(
            &mut app,
            SyncNotification::Rooms(vec![summary("!c:x", Some(RoomType::Calendar))]),
        );
        handle_notification(&mut app, timeline("!c:x", calendar_event("$e1", gig()), true));

        let state = app.store.state();
        assert_eq!(state.events["$e1"].root_event_room_id.as_str(), "!c:x");
        assert!(state.calendars["!c:x"].events.contains_key("$e1"));
    }

    #[test]
    fn backfilled_and_foreign_events_are_ignored() {
        let mut app = app();
        handle_notification(
            &mut app,
            SyncNotification::Rooms(vec![summary("!c:x", Some(RoomType::Calendar))]),
        );

        handle_notification(&mut app, timeline("!c:x", calendar_event("$old", gig()), false));

        let mut message = calendar_event("$m1", json!({ "body": "hi" }));
        message.event_type = "m.room.message".into();
        handle_notification(&mut app, timeline("!c:x", message, true));

        assert!(app.store.state().events.is_empty());
    }

    #[test]
    fn event_for_unknown_calendar_is_not_stored() {
        let mut app = app();
        handle_notification(&mut app, timeline("!nowhere:x", calendar_event("$e1", gig()), true));
        assert!(app.store.state().events.is_empty());
    }

    #[test]
    fn redaction_deletes_known_event() {
        let mut app = app();
        handle_notification(
            &mut app,
            SyncNotification::Rooms(vec![summary("!c:x", Some(RoomType::Calendar))]),
        );
        handle_notification(&mut app, timeline("!c:x", calendar_event("$e1", gig()), true));

        let redaction = RawEvent {
            event_type: EVENT_TYPE_REDACTION.into(),
            event_id: Some("$r1".into()),
            sender: None,
            content: json!({}),
            state_key: None,
            redacts: Some("$e1".into()),
            origin_server_ts: None,
        };
        handle_notification(&mut app, timeline("!c:x", redaction, true));

        let state = app.store.state();
        assert!(state.events.is_empty());
        assert!(state.calendars["!c:x"].events.is_empty());
    }

    #[test]
    fn untagged_summary_keeps_existing_calendar() {
        let mut app = app();
        app.dispatch(Action::SetMatrixCalendar(CalendarRoom::new(
            "!c:x".into(),
            "Gigs",
        )));
        handle_notification(&mut app, SyncNotification::Rooms(vec![summary("!c:x", None)]));

        let state = app.store.state();
        assert!(state.calendars.contains_key("!c:x"));
        assert!(state.standard_rooms.is_empty());
    }

    #[test]
    fn unresolved_event_room_is_left_alone() {
        let mut app = app();
        app.dispatch(Action::SetMatrixEventRoom(RootEventRoom::new(
            "!e:x".into(),
            "Launch",
            "$root".into(),
        )));

        handle_notification(
            &mut app,
            SyncNotification::Rooms(vec![
                summary("!e:x", Some(RoomType::Event)),
                summary("!new:x", Some(RoomType::Event)),
            ]),
        );

        let state = app.store.state();
        assert_eq!(state.event_rooms["!e:x"].root_event_id.as_str(), "$root");
        assert!(!state.event_rooms.contains_key("!new:x"));
        assert!(state.standard_rooms.is_empty());
    }

    #[test]
    fn sync_state_is_recorded() {
        let mut app = app();
        handle_notification(&mut app, SyncNotification::SyncState(SyncState::Prepared));
        assert_eq!(app.sync_state, Some(SyncState::Prepared));
    }

    #[tokio::test]
    async fn reattaching_stops_the_old_receiver() {
        let state = app().into_shared();

        let (old_tx, old_rx) = mpsc::channel(8);
        attach(&state, old_rx).unwrap();
        let (new_tx, new_rx) = mpsc::channel(8);
        attach(&state, new_rx).unwrap();

        // Wait for the abort to drop the old receiver.
        tokio::time::timeout(Duration::from_secs(5), old_tx.closed())
            .await
            .unwrap();

        new_tx
            .send(SyncNotification::SyncState(SyncState::Syncing))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if state.lock().unwrap().sync_state == Some(SyncState::Syncing) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
