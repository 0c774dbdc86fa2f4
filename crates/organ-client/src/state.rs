//! Application root shared by the sync bridge and every command.
//!
//! [`AppState`] is wrapped in `Arc<Mutex<>>`.  The lock is never held across
//! an `.await`, so dispatches are serialized in lock order.

use std::sync::{Arc, Mutex};

use organ_net::{SyncCommand, SyncState};
use organ_state::{Action, Outcome, Store};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::ClientError;

pub type SharedState = Arc<Mutex<AppState>>;

pub struct AppState {
    pub config: ClientConfig,

    /// The normalized state store.  All mutation goes through `dispatch`.
    pub store: Store,

    /// Sender half of the channel to the running client task.
    /// `None` until the client is started.
    pub cmd_tx: Option<mpsc::Sender<SyncCommand>>,

    /// Last sync state reported by the client task.
    pub sync_state: Option<SyncState>,

    /// Notification loop of the current client task.
    pub bridge_task: Option<JoinHandle<()>>,
}

impl AppState {
    pub fn new(config: ClientConfig, store: Store) -> Self {
        Self {
            config,
            store,
            cmd_tx: None,
            sync_state: None,
            bridge_task: None,
        }
    }

    pub fn dispatch(&mut self, action: Action) -> Outcome {
        self.store.dispatch(action)
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }
}

/// Clone the command sender out of the shared state.
pub(crate) fn command_sender(
    state: &SharedState,
) -> Result<mpsc::Sender<SyncCommand>, ClientError> {
    let guard = state.lock()?;
    guard.cmd_tx.clone().ok_or(ClientError::NotStarted)
}
