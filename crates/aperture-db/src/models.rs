//! Database row types mapped straight from SQLite rows, kept separate
//! from the aperture-types API models so the DB layer stays independent.
//! The `into_*` conversions are the only place stored strings become
//! typed fields.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use aperture_types::api::AdminUserEntry;
use aperture_types::models::{Album, ChatKind, ChatMessage, Group, Privacy, Role, UserProfile};

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub avatar: String,
    pub role: String,
    pub is_banned: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            role: self.role(),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }

    pub fn admin_entry(&self) -> AdminUserEntry {
        AdminUserEntry {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            role: self.role(),
            is_banned: self.is_banned,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl GroupRow {
    pub fn into_group(self, owner: Option<UserProfile>, members: Vec<UserProfile>) -> Group {
        Group {
            id: self.id,
            name: self.name,
            owner_id: self.owner_id,
            owner,
            members,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

pub struct AlbumRow {
    pub id: i64,
    pub name: String,
    pub privacy: String,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl AlbumRow {
    pub fn into_album(self, owner: Option<UserProfile>, members: Vec<UserProfile>) -> Album {
        Album {
            id: self.id,
            name: self.name,
            privacy: Privacy::parse(&self.privacy),
            owner_id: self.owner_id,
            owner,
            members,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

/// A message joined with its sender row. Every read path returns messages
/// in this enriched form.
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub chat_type: String,
    pub recipient_id: Option<i64>,
    pub group_id: Option<i64>,
    pub album_id: Option<i64>,
    pub content: String,
    pub timestamp: String,
    pub sender: UserRow,
}

impl MessageRow {
    pub fn into_chat_message(self) -> ChatMessage {
        let chat_type = self.chat_type.parse::<ChatKind>().unwrap_or_else(|_| {
            warn!(
                "Corrupt chat_type '{}' on message {}",
                self.chat_type, self.id
            );
            ChatKind::Private
        });

        ChatMessage {
            id: self.id,
            sender: self.sender.profile(),
            chat_type,
            recipient: self.recipient_id,
            group: self.group_id,
            album: self.album_id,
            content: self.content,
            timestamp: parse_timestamp(&self.timestamp),
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Accept that and RFC 3339, parse as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
