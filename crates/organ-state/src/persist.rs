//! Fire-and-forget mirroring of state changes to local storage.
//!
//! The persistence task owns the [`Database`] and runs on the blocking pool.
//! The rest of the application talks to it through a [`Persister`] handle;
//! sends never block and write failures are logged, not retried.

use std::collections::HashSet;

use organ_shared::{CalendarEvent, Room, RoomId, UserProfile};
use organ_store::{Database, StorageKey, StoreError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::Changes;
use crate::state::GlobalState;

/// Commands sent *into* the persistence task.
#[derive(Debug)]
pub enum PersistCommand {
    Room(Room),
    Event(CalendarEvent),
    RoomIds(HashSet<RoomId>),
    User(UserProfile),
    Remove(StorageKey),
    /// Reply once every earlier command has been applied.
    Flush(oneshot::Sender<()>),
}

/// Handle to the persistence task.
#[derive(Debug, Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl Persister {
    fn send(&self, cmd: PersistCommand) {
        if self.tx.send(cmd).is_err() {
            warn!("Persistence task has stopped, dropping write");
        }
    }

    /// Queue writes for everything `changes` touched.
    pub fn persist(&self, state: &GlobalState, changes: &Changes) {
        for key in &changes.removed {
            self.send(PersistCommand::Remove(key.clone()));
        }

        if changes.user {
            self.send(PersistCommand::User(state.user.clone()));
        }

        if changes.room_ids && !state.matrix_room_ids.is_empty() {
            self.send(PersistCommand::RoomIds(state.matrix_room_ids.clone()));
        }

        for room_id in &changes.rooms {
            if let Some(room) = state.room(room_id) {
                self.send(PersistCommand::Room(room));
            }
        }

        for event_id in &changes.events {
            if let Some(event) = state.events.get(event_id) {
                self.send(PersistCommand::Event(event.clone()));
            }
        }
    }

    /// Wait until every write queued so far has been applied.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PersistCommand::Flush(reply_tx));
        let _ = reply_rx.await;
    }
}

/// Spawn the persistence task.
///
/// The task runs until every [`Persister`] clone is dropped, then hands the
/// database back through its join handle.
pub fn spawn_persister(db: Database) -> (Persister, JoinHandle<Database>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::task::spawn_blocking(move || {
        info!("Persistence task started");
        while let Some(cmd) = rx.blocking_recv() {
            if let PersistCommand::Flush(reply) = cmd {
                let _ = reply.send(());
                continue;
            }
            if let Err(e) = apply(&db, &cmd) {
                warn!(error = %e, command = ?cmd, "Failed to persist");
            }
        }
        info!("Persistence task stopped");
        db
    });

    (Persister { tx }, handle)
}

fn apply(db: &Database, cmd: &PersistCommand) -> Result<(), StoreError> {
    match cmd {
        PersistCommand::Room(room) => {
            let key = StorageKey::Room(room.room_id().clone());
            debug!(key = %key, "Storing room");
            match room {
                Room::Standard(r) => db.set(&key, r),
                Room::Calendar(r) => db.set(&key, r),
                Room::Event(r) => db.set(&key, r),
            }
        }
        PersistCommand::Event(event) => {
            let key = StorageKey::Event(event.event_id.clone());
            debug!(key = %key, "Storing event");
            db.set(&key, event)
        }
        PersistCommand::RoomIds(room_ids) => {
            debug!(count = room_ids.len(), "Storing matrix room ids");
            db.set_room_ids(room_ids)
        }
        PersistCommand::User(user) => db.set(&StorageKey::User, user),
        PersistCommand::Remove(key) => {
            debug!(key = %key, "Removing record");
            db.remove(key).map(|_| ())
        }
        PersistCommand::Flush(_) => Ok(()),
    }
}
