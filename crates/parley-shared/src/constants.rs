/// Application name
pub const APP_NAME: &str = "Parley";

/// Number of messages returned per history page
pub const PAGE_SIZE: u32 = 24;

/// Maximum number of conversation summaries returned by `fetchContacts`
pub const CONTACTS_LIMIT: u32 = 12;

/// Conversation reference that resolves to the requester's self-notes conversation
pub const SELF_NOTES_REF: i64 = 0;

/// Display name given to a freshly created self-notes conversation
pub const SELF_NOTES_NAME: &str = "Notes";

/// Reserved owner id of self-notes conversations. No user row carries it.
pub const SYSTEM_USER_ID: i64 = 0;

/// Maximum size of a single WebSocket frame in bytes (64 KiB)
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Default HTTP / WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Events queued for one socket before it counts as lagging and is dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
