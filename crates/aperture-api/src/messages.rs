use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use aperture_db::queries::MessageFilter;
use aperture_types::api::{
    MessageEnvelope, MessageHistory, MessagesQuery, Pagination, SendMessageRequest,
};
use aperture_types::models::{ChatKind, ChatMessage};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// GET /api/messages: one page of a conversation, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(q): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind_raw = q.chat_type.unwrap_or_default();
    if kind_raw.is_empty() {
        return Err(ApiError::BadRequest("chatType is required."));
    }

    let page = if q.page == 0 { 1 } else { q.page };
    let limit = clamp_limit(q.limit);
    let offset = (page - 1) * limit;

    // Unrecognized kinds are not refused; the filter just matches nothing
    let Ok(kind) = kind_raw.parse::<ChatKind>() else {
        return Ok(Json(MessageHistory {
            messages: vec![],
            pagination: Pagination { page, limit, total: 0 },
        }));
    };

    let filter = match kind {
        ChatKind::Private => {
            let recipient = q.recipient.unwrap_or(0);
            if recipient == 0 {
                return Err(ApiError::BadRequest("recipient is required."));
            }
            // Both directions of the pair; no membership concept here
            MessageFilter::Private { a: current.id, b: recipient }
        }
        ChatKind::Group => {
            let group = q.group.unwrap_or(0);
            if group == 0 {
                return Err(ApiError::BadRequest("group is required."));
            }
            assert_chat_target(&state, kind, group, current.id).await?;
            MessageFilter::Group(group)
        }
        ChatKind::Album => {
            let album = q.album.unwrap_or(0);
            if album == 0 {
                return Err(ApiError::BadRequest("album is required."));
            }
            assert_chat_target(&state, kind, album, current.id).await?;
            MessageFilter::Album(album)
        }
    };

    let db = state.db.clone();
    let (rows, total) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let rows = db.list_messages(filter, limit, offset)?;
        let total = db.count_messages(filter)?;
        Ok((rows, total))
    })
    .await??;

    let messages: Vec<ChatMessage> = rows.into_iter().map(|row| row.into_chat_message()).collect();

    Ok(Json(MessageHistory {
        messages,
        pagination: Pagination { page, limit, total },
    }))
}

/// POST /api/messages: HTTP fallback send, used when the socket is down.
/// Persists and returns the enriched message without any gateway fan-out;
/// socketless sends surface on the next history load.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kind_raw = req.chat_type.unwrap_or_default();
    let content = req.content.unwrap_or_default();
    if kind_raw.is_empty() || content.is_empty() {
        return Err(ApiError::BadRequest("chatType and content are required."));
    }

    let kind: ChatKind = kind_raw
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid chatType."))?;

    let (recipient, group, album) = match kind {
        ChatKind::Private => {
            let recipient = req.recipient.unwrap_or(0);
            if recipient == 0 {
                return Err(ApiError::BadRequest("recipient is required for private chat."));
            }
            (Some(recipient), None, None)
        }
        ChatKind::Group => {
            let group = req.group.unwrap_or(0);
            if group == 0 {
                return Err(ApiError::BadRequest("group is required for group chat."));
            }
            assert_chat_target(&state, kind, group, current.id).await?;
            (None, Some(group), None)
        }
        ChatKind::Album => {
            let album = req.album.unwrap_or(0);
            if album == 0 {
                return Err(ApiError::BadRequest("album is required for album chat."));
            }
            assert_chat_target(&state, kind, album, current.id).await?;
            (None, None, Some(album))
        }
    };

    let user_id = current.id;
    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let id = db.insert_message(user_id, kind, recipient, group, album, &content)?;
        db.get_message(id)?
            .ok_or_else(|| anyhow::anyhow!("message {} missing after insert", id))
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(MessageEnvelope {
            message: row.into_chat_message(),
        }),
    ))
}

/// Shared 404/403 assertion for group and album chat targets: the target
/// must exist and the caller must hold a membership row. Album privacy is
/// ignored here; chat access is the membership row alone.
async fn assert_chat_target(
    state: &AppState,
    kind: ChatKind,
    target: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    let db = state.db.clone();
    let (exists, member) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        match kind {
            ChatKind::Group => Ok((
                db.get_group(target)?.is_some(),
                db.is_group_member(target, user_id)?,
            )),
            ChatKind::Album => Ok((
                db.get_album(target)?.is_some(),
                db.is_album_member(target, user_id)?,
            )),
            ChatKind::Private => Ok((true, true)),
        }
    })
    .await??;

    if !exists {
        return Err(match kind {
            ChatKind::Album => ApiError::NotFound("Album not found."),
            _ => ApiError::NotFound("Group not found."),
        });
    }
    if !member {
        return Err(match kind {
            ChatKind::Album => ApiError::Forbidden("Not a member of this album."),
            _ => ApiError::Forbidden("Not a member of this group."),
        });
    }
    Ok(())
}

fn clamp_limit(limit: u32) -> u32 {
    if limit == 0 { 50 } else { limit.min(200) }
}
