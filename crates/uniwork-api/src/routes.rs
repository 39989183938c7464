//! API route definitions

use crate::auth::{authenticate, authorize};
use crate::handlers::{admin, auth};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uniwork_core::UserRole;

/// Create API v1 routes, mounted under `/api/v1`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh-token", post(auth::refresh_handler));

    // Any authenticated user
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route(
            "/auth/profile",
            get(auth::get_profile_handler).put(auth::update_profile_handler),
        )
        .route("/auth/change-password", post(auth::change_password_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    // Administrators only; layers run bottom-up, so authenticate first
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users_handler))
        .route_layer(middleware::from_fn(authorize(&[UserRole::Admin])))
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
