use crate::Database;
use crate::models::{AlbumRow, GroupRow, MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

use aperture_types::models::{Album, ChatKind, Group, Privacy, Role, UserProfile};

const USER_COLS: &str = "id, name, email, password, avatar, role, is_banned, created_at, updated_at";
const USER_COLS_U: &str =
    "u.id, u.name, u.email, u.password, u.avatar, u.role, u.is_banned, u.created_at, u.updated_at";

/// Which conversation a message read addresses.
#[derive(Debug, Clone, Copy)]
pub enum MessageFilter {
    /// Both directions of a user pair.
    Private { a: i64, b: i64 },
    Group(i64),
    Album(i64),
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        avatar: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (name, email, password, avatar) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, email, password_hash, avatar],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt
                .query_map([], |row| map_user_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Paged listing for the staff dashboard, optionally filtered by a
    /// name substring.
    pub fn list_users_page(
        &self,
        search: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let rows = match search {
                Some(needle) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {USER_COLS} FROM users WHERE name LIKE ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                    ))?;
                    stmt.query_map(
                        rusqlite::params![format!("%{}%", needle), limit, offset],
                        |row| map_user_at(row, 0),
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {USER_COLS} FROM users
                         ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                    ))?;
                    stmt.query_map(rusqlite::params![limit, offset], |row| map_user_at(row, 0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    pub fn count_users(&self, search: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = match search {
                Some(needle) => conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE name LIKE ?1",
                    [format!("%{}%", needle)],
                    |row| row.get(0),
                )?,
                None => conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
            };
            Ok(count as u64)
        })
    }

    /// Updates only the given fields; absent fields keep their value.
    pub fn update_profile(&self, id: i64, name: Option<&str>, avatar: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET name = COALESCE(?1, name), avatar = COALESCE(?2, avatar),
                 updated_at = datetime('now') WHERE id = ?3",
                rusqlite::params![name, avatar, id],
            )?;
            Ok(())
        })
    }

    pub fn set_role(&self, id: i64, role: Role) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET role = ?1, updated_at = datetime('now') WHERE id = ?2",
                rusqlite::params![role.as_str(), id],
            )?;
            Ok(())
        })
    }

    pub fn set_banned(&self, id: i64, banned: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET is_banned = ?1, updated_at = datetime('now') WHERE id = ?2",
                rusqlite::params![banned, id],
            )?;
            Ok(())
        })
    }

    /// Hard delete. Removes the account's messages and memberships in the
    /// same transaction; groups and albums it owned are left behind.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE sender_id = ?1", [id])?;
            tx.execute("DELETE FROM group_members WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM album_members WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Boot-time bootstrap: creates the account with the super admin role,
    /// or promotes it if it already exists under a lesser role.
    pub fn ensure_super_admin(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            if let Some(user) = query_user_by_email(conn, email)? {
                if user.role() != Role::SuperAdmin {
                    conn.execute(
                        "UPDATE users SET role = 'super_admin', updated_at = datetime('now')
                         WHERE id = ?1",
                        [user.id],
                    )?;
                }
                return Ok(user.id);
            }

            conn.execute(
                "INSERT INTO users (name, email, password, role)
                 VALUES (?1, ?2, ?3, 'super_admin')",
                rusqlite::params![name, email, password_hash],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    // -- Groups --

    /// Creates the group and its member rows in one transaction. The
    /// caller passes the final member set (owner included, deduplicated).
    pub fn create_group(&self, name: &str, owner_id: i64, member_ids: &[i64]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO groups (name, owner_id) VALUES (?1, ?2)",
                rusqlite::params![name, owner_id],
            )?;
            let id = tx.last_insert_rowid();
            insert_group_members(&tx, id, member_ids)?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| query_group_row(conn, id))
    }

    pub fn get_group_with_members(&self, id: i64) -> Result<Option<Group>> {
        self.with_conn(|conn| match query_group_row(conn, id)? {
            Some(row) => Ok(Some(query_group_detail(conn, row)?)),
            None => Ok(None),
        })
    }

    /// Groups the user belongs to, most recently touched first.
    pub fn list_groups_for_user(&self, user_id: i64) -> Result<Vec<Group>> {
        self.with_conn(|conn| {
            let rows = {
                let mut stmt = conn.prepare(
                    "SELECT g.id, g.name, g.owner_id, g.created_at, g.updated_at
                     FROM groups g
                     JOIN group_members gm ON gm.group_id = g.id
                     WHERE gm.user_id = ?1
                     ORDER BY g.updated_at DESC, g.id DESC",
                )?;
                stmt.query_map([user_id], map_group_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut groups = Vec::with_capacity(rows.len());
            for row in rows {
                groups.push(query_group_detail(conn, row)?);
            }
            Ok(groups)
        })
    }

    /// Optionally renames and optionally replaces the member set; always
    /// bumps updated_at (edits surface at the top of listings).
    pub fn update_group(
        &self,
        id: i64,
        name: Option<&str>,
        member_set: Option<&[i64]>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE groups SET name = COALESCE(?1, name), updated_at = datetime('now')
                 WHERE id = ?2",
                rusqlite::params![name, id],
            )?;
            if let Some(members) = member_set {
                tx.execute("DELETE FROM group_members WHERE group_id = ?1", [id])?;
                insert_group_members(&tx, id, members)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Removes the group and its membership rows. Messages sent to the
    /// group stay in the store.
    pub fn delete_group(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM group_members WHERE group_id = ?1", [id])?;
            tx.execute("DELETE FROM groups WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    rusqlite::params![group_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Albums --

    pub fn create_album(
        &self,
        name: &str,
        privacy: Privacy,
        owner_id: i64,
        member_ids: &[i64],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO albums (name, privacy, owner_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, privacy.as_str(), owner_id],
            )?;
            let id = tx.last_insert_rowid();
            insert_album_members(&tx, id, member_ids)?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_album(&self, id: i64) -> Result<Option<AlbumRow>> {
        self.with_conn(|conn| query_album_row(conn, id))
    }

    pub fn get_album_with_members(&self, id: i64) -> Result<Option<Album>> {
        self.with_conn(|conn| match query_album_row(conn, id)? {
            Some(row) => Ok(Some(query_album_detail(conn, row)?)),
            None => Ok(None),
        })
    }

    /// Albums visible to the user: public ones plus any they belong to.
    pub fn list_albums_for_user(&self, user_id: i64) -> Result<Vec<Album>> {
        self.with_conn(|conn| {
            let rows = {
                let mut stmt = conn.prepare(
                    "SELECT a.id, a.name, a.privacy, a.owner_id, a.created_at, a.updated_at
                     FROM albums a
                     WHERE a.privacy = 'public'
                        OR EXISTS (SELECT 1 FROM album_members am
                                   WHERE am.album_id = a.id AND am.user_id = ?1)
                     ORDER BY a.updated_at DESC, a.id DESC",
                )?;
                stmt.query_map([user_id], map_album_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut albums = Vec::with_capacity(rows.len());
            for row in rows {
                albums.push(query_album_detail(conn, row)?);
            }
            Ok(albums)
        })
    }

    pub fn update_album(
        &self,
        id: i64,
        name: Option<&str>,
        privacy: Option<Privacy>,
        member_set: Option<&[i64]>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE albums SET name = COALESCE(?1, name),
                 privacy = COALESCE(?2, privacy), updated_at = datetime('now')
                 WHERE id = ?3",
                rusqlite::params![name, privacy.map(|p| p.as_str()), id],
            )?;
            if let Some(members) = member_set {
                tx.execute("DELETE FROM album_members WHERE album_id = ?1", [id])?;
                insert_album_members(&tx, id, members)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Removes the album and its membership rows, never its messages.
    pub fn delete_album(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM album_members WHERE album_id = ?1", [id])?;
            tx.execute("DELETE FROM albums WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_album_member(&self, album_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM album_members WHERE album_id = ?1 AND user_id = ?2",
                    rusqlite::params![album_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        sender_id: i64,
        kind: ChatKind,
        recipient: Option<i64>,
        group: Option<i64>,
        album: Option<i64>,
        content: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, chat_type, recipient_id, group_id, album_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![sender_id, kind.as_str(), recipient, group, album, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Single message joined with its sender, the enriched reload done
    /// right after an insert.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT m.id, m.sender_id, m.chat_type, m.recipient_id, m.group_id, m.album_id,
                        m.content, m.timestamp, {USER_COLS_U}
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE m.id = ?1"
            ))?;
            let row = stmt.query_row([id], map_message).optional()?;
            Ok(row)
        })
    }

    /// One history page, oldest first. Ties on the second-resolution
    /// timestamp are broken by insertion order.
    pub fn list_messages(
        &self,
        filter: MessageFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let select = format!(
                "SELECT m.id, m.sender_id, m.chat_type, m.recipient_id, m.group_id, m.album_id,
                        m.content, m.timestamp, {USER_COLS_U}
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id"
            );
            let order = "ORDER BY m.timestamp ASC, m.id ASC LIMIT ?3 OFFSET ?4";

            let rows = match filter {
                MessageFilter::Private { a, b } => {
                    let mut stmt = conn.prepare(&format!(
                        "{select}
                         WHERE m.chat_type = 'private'
                           AND ((m.sender_id = ?1 AND m.recipient_id = ?2)
                             OR (m.sender_id = ?2 AND m.recipient_id = ?1))
                         {order}"
                    ))?;
                    stmt.query_map(rusqlite::params![a, b, limit, offset], map_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                MessageFilter::Group(group_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "{select}
                         WHERE m.chat_type = 'group' AND m.group_id = ?1
                         ORDER BY m.timestamp ASC, m.id ASC LIMIT ?2 OFFSET ?3"
                    ))?;
                    stmt.query_map(rusqlite::params![group_id, limit, offset], map_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                MessageFilter::Album(album_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "{select}
                         WHERE m.chat_type = 'album' AND m.album_id = ?1
                         ORDER BY m.timestamp ASC, m.id ASC LIMIT ?2 OFFSET ?3"
                    ))?;
                    stmt.query_map(rusqlite::params![album_id, limit, offset], map_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    pub fn count_messages(&self, filter: MessageFilter) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = match filter {
                MessageFilter::Private { a, b } => conn.query_row(
                    "SELECT COUNT(*) FROM messages
                     WHERE chat_type = 'private'
                       AND ((sender_id = ?1 AND recipient_id = ?2)
                         OR (sender_id = ?2 AND recipient_id = ?1))",
                    rusqlite::params![a, b],
                    |row| row.get(0),
                )?,
                MessageFilter::Group(group_id) => conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE chat_type = 'group' AND group_id = ?1",
                    [group_id],
                    |row| row.get(0),
                )?,
                MessageFilter::Album(album_id) => conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE chat_type = 'album' AND album_id = ?1",
                    [album_id],
                    |row| row.get(0),
                )?,
            };
            Ok(count as u64)
        })
    }

    // -- Moderation --

    pub fn log_moderation(
        &self,
        admin_id: i64,
        action_type: &str,
        target_id: i64,
        target_type: &str,
        details: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO moderation_logs (admin_id, action_type, target_id, target_type, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![admin_id, action_type, target_id, target_type, details],
            )?;
            Ok(())
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE email = ?1"))?;
    let row = stmt
        .query_row([email], |row| map_user_at(row, 0))
        .optional()?;
    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    let row = stmt.query_row([id], |row| map_user_at(row, 0)).optional()?;
    Ok(row)
}

fn query_group_row(conn: &Connection, id: i64) -> Result<Option<GroupRow>> {
    let mut stmt = conn
        .prepare("SELECT id, name, owner_id, created_at, updated_at FROM groups WHERE id = ?1")?;
    let row = stmt.query_row([id], map_group_row).optional()?;
    Ok(row)
}

fn query_album_row(conn: &Connection, id: i64) -> Result<Option<AlbumRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, privacy, owner_id, created_at, updated_at FROM albums WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_album_row).optional()?;
    Ok(row)
}

fn query_group_detail(conn: &Connection, row: GroupRow) -> Result<Group> {
    let owner = query_user_by_id(conn, row.owner_id)?.map(|u| u.profile());
    let members = query_member_profiles(
        conn,
        &format!(
            "SELECT {USER_COLS_U} FROM users u
             JOIN group_members gm ON gm.user_id = u.id
             WHERE gm.group_id = ?1 ORDER BY u.id"
        ),
        row.id,
    )?;
    Ok(row.into_group(owner, members))
}

fn query_album_detail(conn: &Connection, row: AlbumRow) -> Result<Album> {
    let owner = query_user_by_id(conn, row.owner_id)?.map(|u| u.profile());
    let members = query_member_profiles(
        conn,
        &format!(
            "SELECT {USER_COLS_U} FROM users u
             JOIN album_members am ON am.user_id = u.id
             WHERE am.album_id = ?1 ORDER BY u.id"
        ),
        row.id,
    )?;
    Ok(row.into_album(owner, members))
}

fn query_member_profiles(conn: &Connection, sql: &str, id: i64) -> Result<Vec<UserProfile>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([id], |row| map_user_at(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.iter().map(|u| u.profile()).collect())
}

// Member ids without a user row are dropped silently, matching how the
// caller-facing surface treats unknown participants.
fn insert_group_members(conn: &Connection, group_id: i64, member_ids: &[i64]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO group_members (group_id, user_id)
         SELECT ?1, id FROM users WHERE id = ?2",
    )?;
    for user_id in member_ids {
        stmt.execute(rusqlite::params![group_id, user_id])?;
    }
    Ok(())
}

fn insert_album_members(conn: &Connection, album_id: i64, member_ids: &[i64]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO album_members (album_id, user_id)
         SELECT ?1, id FROM users WHERE id = ?2",
    )?;
    for user_id in member_ids {
        stmt.execute(rusqlite::params![album_id, user_id])?;
    }
    Ok(())
}

fn map_user_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(base)?,
        name: row.get(base + 1)?,
        email: row.get(base + 2)?,
        password: row.get(base + 3)?,
        avatar: row.get(base + 4)?,
        role: row.get(base + 5)?,
        is_banned: row.get(base + 6)?,
        created_at: row.get(base + 7)?,
        updated_at: row.get(base + 8)?,
    })
}

fn map_group_row(row: &rusqlite::Row) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_album_row(row: &rusqlite::Row) -> rusqlite::Result<AlbumRow> {
    Ok(AlbumRow {
        id: row.get(0)?,
        name: row.get(1)?,
        privacy: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        chat_type: row.get(2)?,
        recipient_id: row.get(3)?,
        group_id: row.get(4)?,
        album_id: row.get(5)?,
        content: row.get(6)?,
        timestamp: row.get(7)?,
        sender: map_user_at(row, 8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
