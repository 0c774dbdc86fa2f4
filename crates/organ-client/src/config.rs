//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use organ_net::SyncConfig;
use organ_shared::constants::{DEFAULT_HOMESERVER, DEFAULT_SYNC_TIMEOUT_MS, RETRY_DELAY_MS};
use organ_store::database::{default_data_dir, DB_FILE_NAME};
use tracing::warn;

/// File in the data directory holding the stored session.
pub const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Env: `ORGAN_HOMESERVER`
    /// Default: `https://matrix.org`
    pub homeserver: String,

    /// Directory holding the database and the session file.
    /// Env: `ORGAN_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: PathBuf,

    /// Env: `ORGAN_SYNC_TIMEOUT_MS`
    pub sync_timeout: Duration,

    /// Credentials for logging in at start-up when no session is stored.
    /// Env: `ORGAN_USER`, `ORGAN_PASSWORD`
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = default_data_dir().unwrap_or_else(|e| {
            warn!(error = %e, "No platform data directory, using ./organ-data");
            PathBuf::from("./organ-data")
        });
        Self {
            homeserver: DEFAULT_HOMESERVER.to_string(),
            data_dir,
            sync_timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            user: None,
            password: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("ORGAN_HOMESERVER") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.homeserver = url.trim_end_matches('/').to_string();
            } else {
                warn!(value = %url, "Invalid ORGAN_HOMESERVER, using default");
            }
        }

        if let Some(dir) = lookup("ORGAN_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(val) = lookup("ORGAN_SYNC_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.sync_timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Invalid ORGAN_SYNC_TIMEOUT_MS, using default"),
            }
        }

        config.user = lookup("ORGAN_USER").filter(|u| !u.is_empty());
        config.password = lookup("ORGAN_PASSWORD").filter(|p| !p.is_empty());

        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE_NAME)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            homeserver: self.homeserver.clone(),
            timeout: self.sync_timeout,
            error_pause: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}
