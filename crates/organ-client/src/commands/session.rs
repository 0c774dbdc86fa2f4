//! Login, stored sessions, and the client-task lifecycle.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use organ_net::{spawn_client, MatrixClient, NetError, Session, SyncCommand};
use organ_shared::UserProfile;
use organ_state::Action;
use tracing::{info, warn};

use super::request;
use crate::bridge;
use crate::error::ClientError;
use crate::state::SharedState;

/// Spawn a client task and make it the active one.
///
/// The bridge is re-attached to the new task before the previous task, if
/// any, is told to shut down.
pub fn start_client(state: &SharedState, session: Option<Session>) -> Result<(), ClientError> {
    let sync_config = state.lock()?.config.sync_config();
    let (cmd_tx, notif_rx) = spawn_client(sync_config, session)?;

    bridge::attach(state, notif_rx)?;

    let previous = state.lock()?.cmd_tx.replace(cmd_tx);
    if let Some(previous) = previous {
        info!("Replacing client task");
        let _ = previous.try_send(SyncCommand::Shutdown);
    }
    Ok(())
}

/// Password login.  Stores the session, restarts the client task with it,
/// and records the user profile.
pub async fn login(state: &SharedState, user: &str, password: &str) -> Result<Session, ClientError> {
    let started = state.lock()?.cmd_tx.is_some();
    if !started {
        start_client(state, None)?;
    }

    let session = request(state, |reply| SyncCommand::Login {
        user: user.to_string(),
        password: password.to_string(),
        reply,
    })
    .await?;

    let (session_path, homeserver) = {
        let app = state.lock()?;
        (app.config.session_path(), app.config.homeserver.clone())
    };
    save_session(&session_path, &session)?;

    start_client(state, Some(session.clone()))?;
    set_user(state, &session, homeserver)?;
    Ok(session)
}

/// Resume the stored session, if any, and start the client task.
///
/// Returns whether a session was resumed.  A session the homeserver rejects
/// is deleted; one that cannot be checked (e.g. offline) is kept.
pub async fn restore_session(state: &SharedState) -> Result<bool, ClientError> {
    let (session_path, homeserver) = {
        let app = state.lock()?;
        (app.config.session_path(), app.config.homeserver.clone())
    };

    let Some(session) = load_session(&session_path)? else {
        info!("No stored session");
        start_client(state, None)?;
        return Ok(false);
    };

    let client = MatrixClient::new(&homeserver)?.with_session(session.clone());
    let session = match client.whoami().await {
        Ok(user_id) => Session { user_id, ..session },
        Err(NetError::Matrix { status: 401, .. }) => {
            warn!("Stored session was rejected, logging out");
            std::fs::remove_file(&session_path)?;
            start_client(state, None)?;
            return Ok(false);
        }
        Err(e) => {
            warn!(error = %e, "Could not verify stored session, resuming anyway");
            session
        }
    };

    info!(user = %session.user_id, "Resuming stored session");
    start_client(state, Some(session.clone()))?;
    set_user(state, &session, homeserver)?;
    Ok(true)
}

fn set_user(state: &SharedState, session: &Session, homeserver: String) -> Result<(), ClientError> {
    state.lock()?.dispatch(Action::SetUser(UserProfile {
        user_id: Some(session.user_id.clone()),
        display_name: None,
        homeserver: Some(homeserver),
    }));
    Ok(())
}

/// Write the session file.  On unix it is readable by the owner only.
pub fn save_session(path: &Path, session: &Session) -> Result<(), ClientError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    // `mode` only applies to newly created files.
    #[cfg(unix)]
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(serde_json::to_string_pretty(session)?.as_bytes())?;
    Ok(())
}

/// Read the stored session.  A missing or unreadable file reads as `None`.
pub fn load_session(path: &Path) -> Result<Option<Session>, ClientError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str(&raw) {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt session file");
            Ok(None)
        }
    }
}
