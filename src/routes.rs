//! HTTP surface: route table, CORS and fallbacks

use crate::auth::{
    api as auth_api, error::ErrorBody, middleware::require_session, models::UserRole, AuthState,
    RoleGate,
};
use crate::middleware::{handle_panic, request_logging};
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Create the API router
pub fn create_router(state: AuthState, client_url: &str) -> Result<Router> {
    let public_routes = Router::new()
        .route("/register", post(auth_api::register))
        .route("/login", post(auth_api::login))
        .route("/refresh-token", post(auth_api::refresh_token))
        .route("/google", get(auth_api::google_login))
        .route("/google/callback", get(auth_api::google_callback));

    let session_routes = Router::new()
        .route("/me", get(auth_api::get_current_user))
        .route("/profile", get(auth_api::get_profile))
        .route("/logout", post(auth_api::logout))
        .route_layer(middleware::from_fn_with_state(
            state.gate(RoleGate::any()),
            require_session,
        ));

    let admin_routes = Router::new()
        .route("/users", get(auth_api::list_users))
        .route_layer(middleware::from_fn_with_state(
            state.gate(RoleGate::only([UserRole::Admin])),
            require_session,
        ));

    let auth_router = public_routes.merge(session_routes).with_state(state.clone());
    let admin_router = admin_routes.with_state(state);

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_router)
        .nest("/api/admin", admin_router)
        .fallback(route_not_found);

    with_service_layers(router, client_url)
}

/// Outermost first: CORS, request logging, then the panic catcher, so a
/// panicking handler is logged as the 500 it becomes.
fn with_service_layers(router: Router, client_url: &str) -> Result<Router> {
    Ok(router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(client_url)?))
}

/// Only the front-end origin may call with credentials
fn cors_layer(client_url: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(client_url)
        .with_context(|| format!("Invalid CLIENT_URL for CORS: {}", client_url))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn route_not_found() -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Route not found")))
}
