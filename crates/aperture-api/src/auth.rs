use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use aperture_db::Database;
use aperture_gateway::router::RoomRouter;
use aperture_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, UserEnvelope, UserListResponse,
};

use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub router: Arc<RoomRouter>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.unwrap_or_default();
    let email = req.email.unwrap_or_default().to_lowercase();
    let password = req.password.unwrap_or_default();
    let avatar = req.avatar.unwrap_or_default();
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("name, email and password are required."));
    }

    let db = state.db.clone();
    let email_check = email.clone();
    if tokio::task::spawn_blocking(move || db.get_user_by_email(&email_check))
        .await??
        .is_some()
    {
        return Err(ApiError::Conflict("Email is already in use."));
    }

    let password_hash = hash_password(&password)?;

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let id = db.create_user(&name, &email, &password_hash, &avatar)?;
        db.get_user_by_id(id)
    })
    .await??
    .ok_or_else(|| anyhow::anyhow!("user missing after insert"))?;

    let token = create_token(&state.jwt_secret, user.id, &user.name)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.profile(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.unwrap_or_default().to_lowercase();
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("email and password are required."));
    }

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_email(&email))
        .await??
        .ok_or(ApiError::Unauthorized("Invalid email or password."))?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored password hash invalid: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("Invalid email or password."))?;

    // A banned account may still log in; the ban bites on protected routes
    let token = create_token(&state.jwt_secret, user.id, &user.name)?;

    Ok(Json(AuthResponse {
        token,
        user: user.profile(),
    }))
}

pub async fn me(
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(UserEnvelope {
        user: current.profile,
    }))
}

/// PATCH /api/auth/me. Only `name` and `avatar` are writable; any other
/// key in the body is refused outright.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    for key in body.keys() {
        if key != "name" && key != "avatar" {
            return Err(ApiError::BadRequest("Only name, avatar can be updated."));
        }
    }

    let name = body
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let avatar = body
        .get("avatar")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let db = state.db.clone();
    let user_id = current.id;
    let user = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        db.update_profile(user_id, name.as_deref(), avatar.as_deref())?;
        db.get_user_by_id(user_id)
    })
    .await??
    .ok_or(ApiError::Unauthorized("User belonging to this token no longer exists."))?;

    Ok(Json(UserEnvelope {
        user: user.profile(),
    }))
}

/// GET /api/auth/users: the people picker, newest accounts first.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users()).await??;

    Ok(Json(UserListResponse {
        users: rows.into_iter().map(|u| u.profile()).collect(),
    }))
}

/// Argon2id hash in PHC string form, ready for storage.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash failed: {}", e))?;
    Ok(hash.to_string())
}

fn create_token(secret: &str, user_id: i64, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(7)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
