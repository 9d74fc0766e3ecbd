//! v001 -- Initial schema creation.
//!
//! Creates the chat tables. Foreign keys carry no `ON DELETE` actions: every
//! cascade is performed explicitly by the engines, and the constraints only
//! catch rows they forgot.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    user_id    INTEGER PRIMARY KEY AUTOINCREMENT CHECK (user_id > 0),
    user_name  TEXT NOT NULL UNIQUE,
    user_photo TEXT                               -- storage path, nullable
);

-- ----------------------------------------------------------------
-- Photos (metadata only; files live wherever the caller put them)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS photos (
    photo_id INTEGER PRIMARY KEY AUTOINCREMENT,
    path     TEXT NOT NULL UNIQUE,
    size     INTEGER NOT NULL CHECK (size >= 0 AND size < 20000000)
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id INTEGER PRIMARY KEY AUTOINCREMENT CHECK (conversation_id > 0),
    last_message_id INTEGER NOT NULL DEFAULT 0    -- 0 = no messages
);

CREATE TABLE IF NOT EXISTS participants (
    conversation_id INTEGER NOT NULL,
    user_id         INTEGER NOT NULL,
    PRIMARY KEY (conversation_id, user_id),

    FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);

CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

-- One row per direct conversation, keyed by the ordered user pair.
CREATE TABLE IF NOT EXISTS direct_pairs (
    user_low        INTEGER NOT NULL,
    user_high       INTEGER NOT NULL,
    conversation_id INTEGER NOT NULL UNIQUE,
    PRIMARY KEY (user_low, user_high),
    CHECK (user_low < user_high),

    FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id)
);

-- ----------------------------------------------------------------
-- Groups
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_groups (
    group_id        INTEGER PRIMARY KEY AUTOINCREMENT CHECK (group_id > 0),
    conversation_id INTEGER NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    description     TEXT,
    photo           TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id)
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id INTEGER NOT NULL,
    user_id  INTEGER NOT NULL,
    PRIMARY KEY (group_id, user_id),

    FOREIGN KEY (group_id) REFERENCES chat_groups(group_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    conversation_id         INTEGER NOT NULL,
    message_id              INTEGER NOT NULL CHECK (message_id > 0),
    sender_id               INTEGER NOT NULL,
    content                 TEXT NOT NULL,
    sent_at                 INTEGER NOT NULL,     -- unix milliseconds
    photo_id                INTEGER,
    replied_conversation_id INTEGER,
    replied_message_id      INTEGER,
    forwarded               INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (conversation_id, message_id),

    FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id),
    FOREIGN KEY (sender_id) REFERENCES users(user_id),
    FOREIGN KEY (photo_id) REFERENCES photos(photo_id),
    FOREIGN KEY (replied_conversation_id, replied_message_id)
        REFERENCES messages(conversation_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_sent
    ON messages(conversation_id, sent_at DESC, message_id DESC);

CREATE INDEX IF NOT EXISTS idx_messages_reply
    ON messages(replied_conversation_id, replied_message_id);

-- ----------------------------------------------------------------
-- Comments (at most one per user per message)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS comments (
    conversation_id INTEGER NOT NULL,
    message_id      INTEGER NOT NULL,
    comment_id      INTEGER NOT NULL CHECK (comment_id > 0),
    user_id         INTEGER NOT NULL,
    user_name       TEXT NOT NULL,        -- denormalized at write time
    content         TEXT NOT NULL,
    PRIMARY KEY (conversation_id, message_id, comment_id),
    UNIQUE (conversation_id, message_id, user_id),

    FOREIGN KEY (conversation_id, message_id)
        REFERENCES messages(conversation_id, message_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);

-- ----------------------------------------------------------------
-- Read receipts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS read_receipts (
    conversation_id INTEGER NOT NULL,
    message_id      INTEGER NOT NULL,
    user_id         INTEGER NOT NULL,
    read_at         INTEGER NOT NULL,     -- unix milliseconds
    PRIMARY KEY (conversation_id, message_id, user_id),

    FOREIGN KEY (conversation_id, message_id)
        REFERENCES messages(conversation_id, message_id),
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
