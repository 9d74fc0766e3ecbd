//! Demo data inserted when an empty store is first initialized.
//!
//! This is a development convenience only: nothing in the engines depends on
//! these rows existing.

use rusqlite::Connection;

const SEED_SQL: &str = r#"
INSERT INTO users (user_name) VALUES
    ('Alice'), ('Bob'), ('Charlie'), ('Alex'), ('Bobby'),
    ('Charles'), ('Linda'), ('Versace'), ('Gucci');

-- 1: direct chat Alice <-> Bob, 2: group with Alice, Bob and Charlie
INSERT INTO conversations (last_message_id) VALUES (4), (1);

INSERT INTO participants (conversation_id, user_id) VALUES
    (1, 1), (1, 2),
    (2, 1), (2, 2), (2, 3);

INSERT INTO direct_pairs (user_low, user_high, conversation_id) VALUES (1, 2, 1);

INSERT INTO chat_groups (conversation_id, name, description)
    VALUES (2, 'Cybersec', 'Hi, cybersec group');

INSERT INTO group_members (group_id, user_id) VALUES (1, 1), (1, 2), (1, 3);

INSERT INTO messages (conversation_id, message_id, sender_id, content, sent_at) VALUES
    (1, 1, 1, 'Hi Bob!!!', 1737478490000),
    (1, 2, 2, 'Hey Ali 💓.', 1737478500000),
    (1, 3, 2, 'Where do you want to go tomorrow?', 1737478510000),
    (1, 4, 1, 'Not sure...', 1737478520000),
    (2, 1, 3, 'Welcome🥳🎉🎊 to the cybersec group💻!!!', 1737478600000);

INSERT INTO comments (conversation_id, message_id, comment_id, user_id, user_name, content)
    VALUES (1, 2, 1, 1, 'Alice', '😍');

INSERT INTO photos (path, size) VALUES ('./images/defaultPP.png', 2183);
"#;

pub fn insert(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SEED_SQL)
}
