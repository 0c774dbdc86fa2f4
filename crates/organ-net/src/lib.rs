// Matrix client-server networking: a reqwest HTTP client plus a background
// sync task driven over tokio mpsc command/notification channels.

pub mod api;
pub mod error;
pub mod matrix;
pub mod retry;
pub mod sync;

pub use api::{MessagesResponse, RawEvent, SyncResponse};
pub use error::NetError;
pub use matrix::{MatrixClient, Session};
pub use retry::RetryCounter;
pub use sync::{spawn_client, RoomSummary, SyncCommand, SyncConfig, SyncNotification, SyncState};
