use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use aperture_db::models::UserRow;
use aperture_types::api::{
    AdminUserListResponse, AdminUsersQuery, ModerationResponse, StatusMessage,
};
use aperture_types::models::Role;
use aperture_types::policy::{self, ModAction};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

fn require_staff(current: &CurrentUser) -> Result<(), ApiError> {
    if current.role.is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You are not allowed to perform this action."))
    }
}

fn require_super_admin(current: &CurrentUser) -> Result<(), ApiError> {
    if current.role == Role::SuperAdmin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You are not allowed to perform this action."))
    }
}

/// Per-target hierarchy gate. All moderation rules live in
/// `aperture_types::policy`; this only maps a refusal to its message.
fn check_hierarchy(actor: Role, target: Role, action: ModAction) -> Result<(), ApiError> {
    if policy::permits(actor, target, action) {
        return Ok(());
    }
    Err(ApiError::Forbidden(match (action, target) {
        (ModAction::Ban, Role::SuperAdmin) => "Cannot ban Super Admin.",
        (ModAction::Ban, _) => "Admins cannot ban other Admins.",
        (ModAction::Demote, _) => "Cannot demote Super Admin.",
        (ModAction::Delete, _) => "Cannot delete Super Admin.",
        _ => "You are not allowed to perform this action.",
    }))
}

/// GET /api/admin/users: paged account listing with ban state, newest
/// first, optional name search.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(q): Query<AdminUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&current)?;

    let page = if q.page == 0 { 1 } else { q.page };
    let limit = if q.limit == 0 { 20 } else { q.limit };
    let offset = (page - 1) * limit;
    let search = q.search.filter(|s| !s.is_empty());

    let db = state.db.clone();
    let (rows, total) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let rows = db.list_users_page(search.as_deref(), limit, offset)?;
        let total = db.count_users(search.as_deref())?;
        Ok((rows, total))
    })
    .await??;

    let total_pages = total.div_ceil(limit as u64);
    Ok(Json(AdminUserListResponse {
        users: rows.into_iter().map(|u| u.admin_entry()).collect(),
        total,
        page,
        total_pages,
    }))
}

/// POST /api/admin/promote/{id}: user -> admin.
pub async fn promote(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&current)?;
    let target = fetch_user(&state, id).await?;

    match target.role() {
        Role::SuperAdmin => return Err(ApiError::BadRequest("User is already a Super Admin.")),
        Role::Admin => return Err(ApiError::BadRequest("User is already an Admin.")),
        Role::User => {}
    }

    let user = apply_moderation(&state, id, move |db| {
        db.set_role(id, Role::Admin)?;
        db.log_moderation(current.id, "promote", id, "user", "Promoted to Admin")
    })
    .await?;

    Ok(Json(ModerationResponse {
        message: "User promoted to Admin.".to_string(),
        user: Some(user.profile()),
    }))
}

/// POST /api/admin/demote/{id}: admin -> user.
pub async fn demote(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&current)?;
    let target = fetch_user(&state, id).await?;

    check_hierarchy(current.role, target.role(), ModAction::Demote)?;
    if target.role() != Role::Admin {
        return Err(ApiError::BadRequest("User is not an Admin."));
    }

    let user = apply_moderation(&state, id, move |db| {
        db.set_role(id, Role::User)?;
        db.log_moderation(current.id, "demote", id, "user", "Demoted to User")
    })
    .await?;

    Ok(Json(ModerationResponse {
        message: "Admin demoted to User.".to_string(),
        user: Some(user.profile()),
    }))
}

/// POST /api/admin/ban/{id}. The flag takes effect on the target's next
/// authenticated request; live gateway sockets are not torn down.
pub async fn ban(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&current)?;
    let target = fetch_user(&state, id).await?;

    check_hierarchy(current.role, target.role(), ModAction::Ban)?;

    let user = apply_moderation(&state, id, move |db| {
        db.set_banned(id, true)?;
        db.log_moderation(current.id, "ban", id, "user", "User banned")
    })
    .await?;

    Ok(Json(ModerationResponse {
        message: "User banned.".to_string(),
        user: Some(user.profile()),
    }))
}

/// POST /api/admin/unban/{id}.
pub async fn unban(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&current)?;
    let target = fetch_user(&state, id).await?;

    check_hierarchy(current.role, target.role(), ModAction::Unban)?;

    let user = apply_moderation(&state, id, move |db| {
        db.set_banned(id, false)?;
        db.log_moderation(current.id, "unban", id, "user", "User unbanned")
    })
    .await?;

    Ok(Json(ModerationResponse {
        message: "User unbanned.".to_string(),
        user: Some(user.profile()),
    }))
}

/// DELETE /api/admin/users/{id}: hard delete. The only path that removes
/// messages, alongside the account's membership rows.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_super_admin(&current)?;
    let target = fetch_user(&state, id).await?;

    check_hierarchy(current.role, target.role(), ModAction::Delete)?;

    let admin_id = current.id;
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        db.delete_user(id)?;
        db.log_moderation(admin_id, "delete_user", id, "user", "User deleted")
    })
    .await??;

    Ok(Json(StatusMessage {
        message: "User deleted.".to_string(),
    }))
}

async fn fetch_user(state: &AppState, id: i64) -> Result<UserRow, ApiError> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.get_user_by_id(id))
        .await??
        .ok_or(ApiError::NotFound("User not found."))
}

/// Runs the mutation plus its audit write off the runtime, then reloads
/// the target for the response envelope.
async fn apply_moderation<F>(
    state: &AppState,
    target_id: i64,
    mutate: F,
) -> Result<UserRow, ApiError>
where
    F: FnOnce(&aperture_db::Database) -> anyhow::Result<()> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        mutate(&db)?;
        db.get_user_by_id(target_id)
    })
    .await??
    .ok_or(ApiError::NotFound("User not found."))
}
