use thiserror::Error;

/// Errors talking to the homeserver.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The homeserver answered with a Matrix error body.
    #[error("Homeserver returned {status}: {errcode}: {message}")]
    Matrix {
        status: u16,
        errcode: String,
        message: String,
    },

    #[error("Invalid homeserver URL: {0}")]
    InvalidHomeserver(String),

    /// An authenticated endpoint was called without a session.
    #[error("Not logged in")]
    NotLoggedIn,

    /// The client task has stopped and can no longer take commands.
    #[error("Client task is not running")]
    TaskStopped,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetError {
    /// `M_NOT_FOUND` and friends: the resource simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Matrix { status: 404, .. })
    }
}
