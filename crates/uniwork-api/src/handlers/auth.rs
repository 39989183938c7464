//! Authentication API handlers
//!
//! Thin adapters from HTTP to [`crate::auth::AuthService`]. Malformed JSON
//! bodies are turned into validation errors instead of axum's plain-text
//! rejections.

use crate::audit::RequestMeta;
use crate::auth::{
    AuthenticatedUser, ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, UpdateProfileRequest,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Confirmation body for operations with nothing else to return
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub message_fa: String,
}

impl MessageResponse {
    fn new(message: &str, message_fa: &str) -> Self {
        Self {
            message: message.to_string(),
            message_fa: message_fa.to_string(),
        }
    }
}

/// `POST /auth/register` - create an account and return a token pair
///
/// * `201 Created` - account created, tokens issued
/// * `400 Bad Request` - invalid input, weak password, taken username/email
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let response = state
        .auth
        .register(request, &RequestMeta::from_headers(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /auth/login` - exchange credentials for a token pair
///
/// Replaces any refresh token issued earlier to the same user.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let response = state
        .auth
        .login(request, &RequestMeta::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// `POST /auth/refresh-token` - rotate the token pair
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let response = state
        .auth
        .refresh(request, &RequestMeta::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// `POST /auth/logout` - revoke the caller's refresh token
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    state
        .auth
        .logout(&user, request, &RequestMeta::from_headers(&headers))
        .await?;

    Ok(Json(MessageResponse::new(
        "Logged out successfully",
        "با موفقیت خارج شدید",
    )))
}

/// `GET /auth/profile`
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.get_profile(user.user_id).await?;
    Ok(Json(profile))
}

/// `PUT /auth/profile`
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let profile = state.auth.update_profile(user.user_id, request).await?;
    Ok(Json(profile))
}

/// `POST /auth/change-password` - also signs the user out of refresh
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    state
        .auth
        .change_password(&user, request, &RequestMeta::from_headers(&headers))
        .await?;

    Ok(Json(MessageResponse::new(
        "Password changed successfully, please log in again",
        "رمز عبور با موفقیت تغییر کرد، لطفاً دوباره وارد شوید",
    )))
}
