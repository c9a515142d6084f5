use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use aperture_db::models::GroupRow;
use aperture_types::api::{
    CreateGroupRequest, GroupEnvelope, GroupListResponse, StatusMessage, UpdateGroupRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Final member set for a group or album: the owner plus the requested
/// ids, deduplicated, zero ids dropped.
pub(crate) fn member_set(owner_id: i64, members: &[i64]) -> Vec<i64> {
    let mut set = vec![owner_id];
    for &id in members {
        if id != 0 && !set.contains(&id) {
            set.push(id);
        }
    }
    set
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Group name is required."));
    }

    let owner_id = current.id;
    let members = member_set(owner_id, &req.members);

    let db = state.db.clone();
    let group = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let id = db.create_group(&name, owner_id, &members)?;
        db.get_group_with_members(id)
    })
    .await??
    .ok_or_else(|| anyhow::anyhow!("group missing after insert"))?;

    Ok((StatusCode::CREATED, Json(GroupEnvelope { group })))
}

/// Groups the caller belongs to, most recently touched first.
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = current.id;
    let groups = tokio::task::spawn_blocking(move || db.list_groups_for_user(user_id)).await??;

    Ok(Json(GroupListResponse { groups }))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = current.id;
    let (group, member) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let group = db.get_group_with_members(id)?;
        let member = db.is_group_member(id, user_id)?;
        Ok((group, member))
    })
    .await??;

    let group = group.ok_or(ApiError::NotFound("Group not found."))?;
    if !member && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Access denied."));
    }

    Ok(Json(GroupEnvelope { group }))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_group(&state, id).await?;
    if row.owner_id != current.id && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Only owner can update group."));
    }

    let name = req.name.filter(|n| !n.is_empty());
    // The owner stays a member through any member replacement
    let members = req.members.map(|m| member_set(row.owner_id, &m));

    let db = state.db.clone();
    let group = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        db.update_group(id, name.as_deref(), members.as_deref())?;
        db.get_group_with_members(id)
    })
    .await??
    .ok_or(ApiError::NotFound("Group not found."))?;

    Ok(Json(GroupEnvelope { group }))
}

/// Deletes the group and its membership rows; its messages stay put.
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_group(&state, id).await?;
    if row.owner_id != current.id && !current.role.is_staff() {
        return Err(ApiError::Forbidden("Only owner can delete group."));
    }

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.delete_group(id)).await??;

    Ok(Json(StatusMessage {
        message: "Group deleted.".to_string(),
    }))
}

async fn fetch_group(state: &AppState, id: i64) -> Result<GroupRow, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.get_group(id))
        .await??
        .ok_or(ApiError::NotFound("Group not found."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_set_keeps_owner_and_dedups() {
        assert_eq!(member_set(1, &[2, 3, 2, 1]), vec![1, 2, 3]);
        assert_eq!(member_set(1, &[]), vec![1]);
        assert_eq!(member_set(1, &[0, 4]), vec![1, 4]);
    }
}
