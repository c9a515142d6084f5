use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use aperture_db::models::AlbumRow;
use aperture_types::api::{
    AlbumEnvelope, AlbumListResponse, CreateAlbumRequest, StatusMessage, UpdateAlbumRequest,
};
use aperture_types::models::Privacy;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::groups::member_set;
use crate::middleware::CurrentUser;

/// Cap on the final member set, owner included.
const MAX_ALBUM_MEMBERS: usize = 20;

pub async fn create_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateAlbumRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Album name is required."));
    }

    let owner_id = current.id;
    let members = member_set(owner_id, &req.members);
    if members.len() > MAX_ALBUM_MEMBERS {
        return Err(ApiError::BadRequest("Max 20 participants per album."));
    }

    let privacy = req.privacy;
    let db = state.db.clone();
    let album = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let id = db.create_album(&name, privacy, owner_id, &members)?;
        db.get_album_with_members(id)
    })
    .await??
    .ok_or_else(|| anyhow::anyhow!("album missing after insert"))?;

    Ok((StatusCode::CREATED, Json(AlbumEnvelope { album })))
}

/// Albums visible to the caller: public ones plus any they belong to.
pub async fn list_albums(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = current.id;
    let albums = tokio::task::spawn_blocking(move || db.list_albums_for_user(user_id)).await??;

    Ok(Json(AlbumListResponse { albums }))
}

pub async fn get_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = current.id;
    let (album, member) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let album = db.get_album_with_members(id)?;
        let member = db.is_album_member(id, user_id)?;
        Ok((album, member))
    })
    .await??;

    let album = album.ok_or(ApiError::NotFound("Album not found."))?;
    if album.privacy != Privacy::Public && !member && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Access denied."));
    }

    Ok(Json(AlbumEnvelope { album }))
}

pub async fn update_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAlbumRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_album(&state, id).await?;
    if row.owner_id != current.id && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Only the album owner can update it."));
    }

    let name = req.name.filter(|n| !n.is_empty());
    let members = req.members.map(|m| member_set(row.owner_id, &m));
    if let Some(set) = &members {
        if set.len() > MAX_ALBUM_MEMBERS {
            return Err(ApiError::BadRequest("Max 20 participants per album."));
        }
    }

    let privacy = req.privacy;
    let db = state.db.clone();
    let album = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        db.update_album(id, name.as_deref(), privacy, members.as_deref())?;
        db.get_album_with_members(id)
    })
    .await??
    .ok_or(ApiError::NotFound("Album not found."))?;

    Ok(Json(AlbumEnvelope { album }))
}

/// Deletes the album and its membership rows; its messages stay put.
pub async fn delete_album(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_album(&state, id).await?;
    if row.owner_id != current.id && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Only the album owner can delete it."));
    }

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.delete_album(id)).await??;

    Ok(Json(StatusMessage {
        message: "Album deleted.".to_string(),
    }))
}

async fn fetch_album(state: &AppState, id: i64) -> Result<AlbumRow, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.get_album(id))
        .await??
        .ok_or(ApiError::NotFound("Album not found."))
}
