//! # organ-shared
//!
//! Domain model shared by every Organ crate: Matrix identifiers, the three
//! room kinds, calendar events, the custom event payloads exchanged with the
//! homeserver, and the tagged JSON codec used by local persistence.

pub mod codec;
pub mod constants;
pub mod error;
pub mod links;
pub mod protocol;
pub mod types;
pub mod validate;

pub use error::{CodecError, ValidationError};
pub use types::*;
