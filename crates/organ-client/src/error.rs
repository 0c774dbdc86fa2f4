use organ_net::NetError;
use organ_shared::RoomId;
use organ_state::Skip;
use organ_store::StoreError;
use thiserror::Error;

/// Failures of user-facing commands.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock poisoned")]
    LockPoisoned,

    /// No client task is running yet.
    #[error("Client not started")]
    NotStarted,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A link we recognise but cannot follow yet (iCalendar feeds).
    #[error("Unsupported link: {0}")]
    Unsupported(String),

    #[error("Already following {0}")]
    AlreadyFollowing(RoomId),

    /// The room is not among the joined rooms.
    #[error("Not joined to {0}")]
    NotJoined(RoomId),

    #[error("Unknown calendar {0}")]
    UnknownCalendar(RoomId),

    /// The state store refused the change.
    #[error("Change rejected: {0:?}")]
    Rejected(Skip),
}

impl<T> From<std::sync::PoisonError<T>> for ClientError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
