use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use aperture_types::api::Claims;
use aperture_types::models::{Role, UserProfile};

use crate::auth::AppState;
use crate::error::ApiError;

/// Authenticated caller, inserted as a request extension by require_auth.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub role: Role,
    pub profile: UserProfile,
}

/// Extract and validate the bearer token, then load the account. Token
/// subjects that no longer exist and banned accounts are refused here, so
/// every protected handler sees a live caller.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("Authentication token is required."))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized("Authentication token is required."))?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Please authenticate."))?
    .claims;

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_id(claims.sub))
        .await??
        .ok_or(ApiError::Unauthorized("User belonging to this token no longer exists."))?;

    if user.is_banned {
        return Err(ApiError::Forbidden("Your account has been banned."));
    }

    let current = CurrentUser {
        id: user.id,
        role: user.role(),
        profile: user.profile(),
    };
    req.extensions_mut().insert(current);
    Ok(next.run(req).await)
}
