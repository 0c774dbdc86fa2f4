//! # organ-store
//!
//! On-device key/value persistence for Organ, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`.  Values are JSON documents written with the tagged
//! codec from `organ-shared`, addressed by room id, event id, or one of the
//! fixed keys (`"matrixRoomIds"`, `"user"`).

pub mod database;
pub mod kv;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use kv::StorageKey;
