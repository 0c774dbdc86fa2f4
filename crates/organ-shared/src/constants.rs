/// Application name
pub const APP_NAME: &str = "Organ";

/// Timeline event type carrying a calendar entry
pub const EVENT_TYPE_CALENDAR_EVENT: &str = "directory.radical.event.v1";

/// State event type tagging a room as `calendar` or `event`
pub const STATE_TYPE_ROOM_TYPE: &str = "directory.radical.room_type.v1";

/// State event type naming the authoritative event of an event room
pub const STATE_TYPE_ROOT_EVENT_ID: &str = "directory.radical.root_event_id.v1";

/// Redactions remove an event from every calendar that indexed it
pub const EVENT_TYPE_REDACTION: &str = "m.room.redaction";

/// Default homeserver
pub const DEFAULT_HOMESERVER: &str = "https://matrix.org";

/// Storage key holding the list of every known room id
pub const KEY_MATRIX_ROOM_IDS: &str = "matrixRoomIds";

/// Storage key holding the user profile
pub const KEY_USER: &str = "user";

/// Delay between connection attempts in milliseconds
pub const RETRY_DELAY_MS: u64 = 15_000;

/// Long-poll timeout for `/sync` in milliseconds
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 30_000;
