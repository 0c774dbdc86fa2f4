//! User-facing operations.
//!
//! Each sub-module groups related commands.  Commands take the shared
//! [`AppState`](crate::state::AppState) handle, talk to the client task over
//! its command channel, and dispatch the resulting state changes.

pub mod calendar;
pub mod follow;
pub mod session;

use organ_net::{NetError, SyncCommand};
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::state::{command_sender, SharedState};

/// Send a command to the client task and wait for its reply.
pub(crate) async fn request<T>(
    state: &SharedState,
    build: impl FnOnce(oneshot::Sender<Result<T, NetError>>) -> SyncCommand,
) -> Result<T, ClientError> {
    let cmd_tx = command_sender(state)?;
    let (reply_tx, reply_rx) = oneshot::channel();

    cmd_tx
        .send(build(reply_tx))
        .await
        .map_err(|_| NetError::TaskStopped)?;

    let result = reply_rx.await.map_err(|_| NetError::TaskStopped)?;
    Ok(result?)
}
