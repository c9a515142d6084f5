use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar      TEXT NOT NULL DEFAULT '',
            role        TEXT NOT NULL DEFAULT 'user'
                        CHECK (role IN ('user', 'admin', 'super_admin')),
            is_banned   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            owner_id    INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS albums (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            privacy     TEXT NOT NULL DEFAULT 'private'
                        CHECK (privacy IN ('public', 'private')),
            owner_id    INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS album_members (
            album_id    INTEGER NOT NULL REFERENCES albums(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (album_id, user_id)
        );

        -- Target columns intentionally carry no foreign keys: deleting a
        -- group or album leaves its messages in place.
        CREATE TABLE IF NOT EXISTS messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id    INTEGER NOT NULL REFERENCES users(id),
            chat_type    TEXT NOT NULL
                         CHECK (chat_type IN ('private', 'group', 'album')),
            recipient_id INTEGER,
            group_id     INTEGER,
            album_id     INTEGER,
            content      TEXT NOT NULL,
            timestamp    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_private
            ON messages(sender_id, recipient_id, timestamp);

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, timestamp);

        CREATE INDEX IF NOT EXISTS idx_messages_album
            ON messages(album_id, timestamp);

        CREATE TABLE IF NOT EXISTS moderation_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            admin_id    INTEGER NOT NULL,
            action_type TEXT NOT NULL,
            target_id   INTEGER NOT NULL,
            target_type TEXT NOT NULL,
            details     TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
