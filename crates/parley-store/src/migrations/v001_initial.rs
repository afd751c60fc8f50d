//! v001 -- Initial schema creation.
//!
//! Creates `users`, `friends`, `conversations`, `conversation_members` and
//! `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (rows are written by registration; the gateway only
-- touches presence columns)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,  -- 0 is reserved for the system owner
    username      TEXT NOT NULL UNIQUE,
    email         TEXT,
    avatar        TEXT,
    status        TEXT NOT NULL DEFAULT 'default',
    password_hash TEXT NOT NULL,
    is_online     INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1
    last_online   TEXT,                               -- RFC-3339, nullable
    created_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Friends (set semantics, one row per directed edge)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friends (
    user_id    INTEGER NOT NULL,
    friend_id  INTEGER NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (friend_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Conversations (direct, group, or self-notes)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT,
    avatar         TEXT,
    owner_id       INTEGER NOT NULL,          -- creator, or 0 for self-notes
    self_notes_for INTEGER UNIQUE,            -- set only on self-notes rows
    message_count  INTEGER NOT NULL DEFAULT 0,
    last_message   TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    FOREIGN KEY (self_notes_for) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS conversation_members (
    conversation_id INTEGER NOT NULL,
    user_id         INTEGER NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_user ON conversation_members(user_id);

-- ----------------------------------------------------------------
-- Messages (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL,
    owner_id        INTEGER NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,             -- RFC-3339, microseconds

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at DESC, id DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
