//! Session Gate - authentication back-end
//! Mission: Issue, verify, refresh and revoke token sessions; gate routes by role

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_gate_backend::{
    auth::{user_store::seed_admin, AuthState, GoogleOAuthProvider, JwtHandler, SqliteUserStore},
    create_router, AuthConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    info!("🚀 Session Gate starting");

    let config = AuthConfig::from_env().context("Invalid configuration")?;

    let user_store = Arc::new(SqliteUserStore::new(&config.db_path)?);
    info!("🔐 User store initialized at: {}", config.db_path);

    if let Some(seed) = &config.admin_seed {
        seed_admin(user_store.as_ref(), &seed.username, &seed.email, &seed.password).await?;
    }

    let jwt_handler = Arc::new(JwtHandler::new(config.access.clone(), config.refresh.clone()));
    let mut auth_state = AuthState::new(user_store, jwt_handler, &config);

    match config.google.clone() {
        Some(google) => {
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .context("Failed to build HTTP client")?;
            auth_state = auth_state.with_oauth(Arc::new(GoogleOAuthProvider::new(http_client, google)));
            info!("Google sign-in enabled");
        }
        None => warn!("Google sign-in disabled: GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET not set"),
    }

    info!(
        transport = ?config.transport,
        secure_cookies = config.secure_cookies,
        "Token transport configured"
    );

    let app = create_router(auth_state, &config.client_url)?;

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,session_gate=debug,session_gate_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate's own .env when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
