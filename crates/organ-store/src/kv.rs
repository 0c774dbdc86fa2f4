//! Key/value access to the `kv` table.

use std::collections::HashSet;

use chrono::Utc;
use organ_shared::codec;
use organ_shared::constants::{KEY_MATRIX_ROOM_IDS, KEY_USER};
use organ_shared::{EventId, RoomId};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::Result;

/// Address of a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// The set of every known room id.
    MatrixRoomIds,
    /// The user profile.
    User,
    /// A room record, keyed by room id.
    Room(RoomId),
    /// An event record, keyed by event id.
    Event(EventId),
}

impl StorageKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MatrixRoomIds => KEY_MATRIX_ROOM_IDS,
            Self::User => KEY_USER,
            Self::Room(id) => id.as_str(),
            Self::Event(id) => id.as_str(),
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Database {
    // ------------------------------------------------------------------
    // Raw
    // ------------------------------------------------------------------

    /// Read the raw stored text, or `None` if the key is absent.
    pub fn get_raw(&self, key: &StorageKey) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace the raw stored text.
    pub fn set_raw(&self, key: &StorageKey, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key.as_str(), value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a key.  Returns `true` if a row was deleted.
    pub fn remove(&self, key: &StorageKey) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key.as_str()])?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Typed
    // ------------------------------------------------------------------

    /// Decode the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and store `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &StorageKey, value: &T) -> Result<()> {
        let raw = codec::encode(value)?;
        self.set_raw(key, &raw)
    }

    /// Read the known-room-id set.
    pub fn get_room_ids(&self) -> Result<Option<HashSet<RoomId>>> {
        match self.get_raw(&StorageKey::MatrixRoomIds)? {
            Some(raw) => Ok(Some(codec::decode_set(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store the known-room-id set.
    pub fn set_room_ids(&self, room_ids: &HashSet<RoomId>) -> Result<()> {
        let raw = codec::encode_set(room_ids)?;
        self.set_raw(&StorageKey::MatrixRoomIds, &raw)
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
