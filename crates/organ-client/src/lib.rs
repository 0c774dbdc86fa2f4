//! # organ-client
//!
//! Application root for Organ: configuration, the shared [`AppState`], the
//! sync bridge feeding homeserver events into the state store, and the
//! user-facing commands.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod state;

use organ_net::SyncCommand;
use organ_state::{hydrate, spawn_persister, Action, Store};
use organ_store::Database;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::ClientError;
pub use state::{AppState, SharedState};

use crate::commands::session::{login, restore_session};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("organ_client=debug,organ_net=debug,organ_state=debug,organ_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Hydrate the store from disk, resume or establish a session, and keep
/// syncing until Ctrl-C.
pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    info!(homeserver = %config.homeserver, data_dir = %config.data_dir.display(), "Starting Organ");

    std::fs::create_dir_all(&config.data_dir)?;
    let db = Database::open_at(&config.database_path())?;
    let snapshot = hydrate(&db)?;

    let (persister, _persist_task) = spawn_persister(db);
    let mut store = Store::with_persister(persister);
    store.dispatch(Action::InitialiseState(Box::new(snapshot)));

    let state = AppState::new(config.clone(), store).into_shared();

    if !restore_session(&state).await? {
        match (&config.user, &config.password) {
            (Some(user), Some(password)) => {
                login(&state, user, password).await?;
            }
            _ => info!("Not logged in, set ORGAN_USER and ORGAN_PASSWORD to log in"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let (cmd_tx, persister) = {
        let mut app = state.lock().map_err(ClientError::from)?;
        (app.cmd_tx.take(), app.store.persister().cloned())
    };
    if let Some(cmd_tx) = cmd_tx {
        let _ = cmd_tx.send(SyncCommand::Shutdown).await;
    }
    if let Some(persister) = persister {
        persister.flush().await;
    }
    Ok(())
}
