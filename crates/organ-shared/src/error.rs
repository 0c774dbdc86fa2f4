use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a persisted record was rejected during hydration.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Record {key} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record {key} is stored under a different id ({found})")]
    KeyMismatch { key: String, found: String },

    #[error("Record {key} has an unknown room type tag: {tag}")]
    UnknownRoomType { key: String, tag: String },

    #[error("Event {event_id} is indexed by calendar {calendar_id} but owned by {owner}")]
    OrphanEvent {
        event_id: String,
        calendar_id: String,
        owner: String,
    },
}
