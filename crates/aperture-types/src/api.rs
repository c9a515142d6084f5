use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Album, ChatMessage, Group, Privacy, Role, UserProfile};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway's upgrade
/// check. Canonical definition lives here to avoid drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

/// Registration body. Presence is validated in the handler so missing
/// fields produce the platform's own 400 message.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserProfile>,
}

// -- Messages --

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

/// Query string for `GET /api/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub chat_type: Option<String>,
    pub recipient: Option<i64>,
    pub group: Option<i64>,
    pub album: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Body of the HTTP fallback send.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_type: Option<String>,
    pub recipient: Option<i64>,
    pub group: Option<i64>,
    pub album: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageEnvelope {
    pub message: ChatMessage,
}

#[derive(Debug, Serialize)]
pub struct MessageHistory {
    pub messages: Vec<ChatMessage>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

// -- Groups --

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub members: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct GroupEnvelope {
    pub group: Group,
}

#[derive(Debug, Serialize)]
pub struct GroupListResponse {
    pub groups: Vec<Group>,
}

// -- Albums --

#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<i64>,
    #[serde(default)]
    pub privacy: Privacy,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAlbumRequest {
    pub name: Option<String>,
    pub members: Option<Vec<i64>>,
    pub privacy: Option<Privacy>,
}

#[derive(Debug, Serialize)]
pub struct AlbumEnvelope {
    pub album: Album,
}

#[derive(Debug, Serialize)]
pub struct AlbumListResponse {
    pub albums: Vec<Album>,
}

// -- Admin --

fn default_admin_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct AdminUsersQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_limit")]
    pub limit: u32,
    pub search: Option<String>,
}

/// Row shape for the staff user listing (includes ban state).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserEntry {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub avatar: String,
    pub role: Role,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserListResponse {
    pub users: Vec<AdminUserEntry>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
}

/// `{ message, user }` envelope returned by moderation actions.
#[derive(Debug, Serialize)]
pub struct ModerationResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Plain `{ message }` body used by delete-style endpoints.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}
