use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role, in ascending order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Admins and super admins; everyone with moderation powers.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Parses a stored role string. Unknown values map to the
    /// least-privileged role.
    pub fn parse(s: &str) -> Role {
        match s {
            "super_admin" => Role::SuperAdmin,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// The three kinds of conversation a message can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Album,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Private => "private",
            ChatKind::Group => "group",
            ChatKind::Album => "album",
        }
    }
}

impl std::str::FromStr for ChatKind {
    type Err = UnknownChatKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(ChatKind::Private),
            "group" => Ok(ChatKind::Group),
            "album" => Ok(ChatKind::Album),
            other => Err(UnknownChatKind(other.to_string())),
        }
    }
}

/// A chat type string outside `private`/`group`/`album`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown chat type '{0}'")]
pub struct UnknownChatKind(pub String);

/// Album visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
        }
    }

    /// Parses a stored privacy string. Unknown values map to `Private`.
    pub fn parse(s: &str) -> Privacy {
        match s {
            "public" => Privacy::Public,
            _ => Privacy::Private,
        }
    }
}

impl Default for Privacy {
    fn default() -> Self {
        Privacy::Private
    }
}

/// Public account attributes, the shape embedded in messages, member
/// lists and auth responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat group with its resolved owner and member profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    /// `None` when the owning account has since been deleted.
    pub owner: Option<UserProfile>,
    pub members: Vec<UserProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shared album. Chat-wise identical to a group plus a visibility flag;
/// the flag gates browsing, never chat membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub privacy: Privacy,
    pub owner_id: i64,
    pub owner: Option<UserProfile>,
    pub members: Vec<UserProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted message joined with its sender's profile: the shape every
/// read path and broadcast returns. Untargeted columns serialize as null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub sender: UserProfile,
    pub chat_type: ChatKind,
    pub recipient: Option<i64>,
    pub group: Option<i64>,
    pub album: Option<i64>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
