//! Server assembly: configuration, routing, CORS and the WebSocket
//! upgrade gate. Kept in the library so integration tests can serve the
//! exact stack the binary runs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use aperture_api::auth::{self, AppState, AppStateInner};
use aperture_api::middleware::require_auth;
use aperture_api::{admin, albums, groups, messages};
use aperture_db::Database;
use aperture_gateway::connection;
use aperture_gateway::dispatcher::Dispatcher;
use aperture_gateway::router::RoomRouter;
use aperture_types::api::Claims;

/// Runtime configuration, read from `APERTURE_*` environment variables.
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

impl Config {
    /// The JWT secret has no default; the server refuses to boot without it.
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("APERTURE_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("APERTURE_JWT_SECRET is not set"))?;
        let db_path = std::env::var("APERTURE_DB_PATH").unwrap_or_else(|_| "aperture.db".into());
        let host = std::env::var("APERTURE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("APERTURE_PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()?;
        let frontend_url = std::env::var("APERTURE_FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());

        Ok(Config {
            jwt_secret,
            db_path,
            host,
            port,
            frontend_url,
        })
    }
}

/// Wires the shared state: one database handle, one dispatcher, one room
/// router serving both the REST surface and the gateway.
pub fn build_state(db: Arc<Database>, jwt_secret: String) -> AppState {
    let dispatcher = Dispatcher::new();
    let router = Arc::new(RoomRouter::new(db.clone(), dispatcher));
    Arc::new(AppStateInner {
        db,
        jwt_secret,
        router,
    })
}

/// Assembles the full application router.
pub fn build_router(state: AppState, frontend_url: &str) -> anyhow::Result<Router> {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/me", patch(auth::update_profile))
        .route("/api/auth/users", get(auth::list_users))
        .route("/api/messages", get(messages::get_messages))
        .route("/api/messages", post(messages::send_message))
        .route("/api/groups", post(groups::create_group))
        .route("/api/groups", get(groups::list_groups))
        .route("/api/groups/{id}", get(groups::get_group))
        .route("/api/groups/{id}", patch(groups::update_group))
        .route("/api/groups/{id}", delete(groups::delete_group))
        .route("/api/albums", post(albums::create_album))
        .route("/api/albums", get(albums::list_albums))
        .route("/api/albums/{id}", get(albums::get_album))
        .route("/api/albums/{id}", patch(albums::update_album))
        .route("/api/albums/{id}", delete(albums::delete_album))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", delete(admin::delete_user))
        .route("/api/admin/promote/{id}", post(admin::promote))
        .route("/api/admin/demote/{id}", post(admin::demote))
        .route("/api/admin/ban/{id}", post(admin::ban))
        .route("/api/admin/unban/{id}", post(admin::unban))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

/// GET /gateway?token=... The token is checked before the upgrade
/// completes, so a bad credential costs a 401 handshake and never a socket.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token = params.token.ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?
    .claims;

    let router = state.router.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, router, claims.sub, claims.name)
    }))
}
