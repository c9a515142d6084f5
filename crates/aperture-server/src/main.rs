use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use aperture_server::{Config, build_router, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aperture=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(aperture_db::Database::open(&PathBuf::from(&config.db_path))?);

    // Optional super admin bootstrap
    if let (Ok(email), Ok(password)) = (
        std::env::var("APERTURE_SUPER_ADMIN_EMAIL"),
        std::env::var("APERTURE_SUPER_ADMIN_PASSWORD"),
    ) {
        let name = std::env::var("APERTURE_SUPER_ADMIN_NAME")
            .unwrap_or_else(|_| "Super Admin".into());
        let password_hash = aperture_api::auth::hash_password(&password)?;
        let id = db.ensure_super_admin(&name, &email.to_lowercase(), &password_hash)?;
        info!("Super admin account ready (id {})", id);
    }

    // Shared state and routes
    let state = build_state(db, config.jwt_secret.clone());
    let app = build_router(state, &config.frontend_url)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Aperture chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
