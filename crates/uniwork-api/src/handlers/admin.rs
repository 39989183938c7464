//! Administrator handlers
//!
//! Mounted behind `authenticate` and `authorize(&[UserRole::Admin])`.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use uniwork_core::UserPublic;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserPublic>,
    pub count: usize,
}

/// `GET /admin/users` - every account, oldest first
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.auth.list_users().await?;

    Ok(Json(UserListResponse {
        count: users.len(),
        users,
    }))
}
