//! API error handling
//!
//! Every failure a handler can produce is one of five [`AppError`] kinds.
//! Each kind maps to a fixed status code and a bilingual JSON body:
//!
//! ```json
//! { "code": "AUTHENTICATION_ERROR", "message": "...", "message_fa": "..." }
//! ```
//!
//! Internal errors also carry `retryable`. Their detail text is logged and,
//! only in development, copied into `details` by
//! [`crate::middleware::expose_error_details`].

use crate::auth::password::{PasswordError, PasswordPolicy};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uniwork_core::UniworkError;

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// English message
    pub message: String,
    /// Persian message
    pub message_fa: String,
    /// Whether retrying the same request may succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Internal detail, development only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        message_fa: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            message_fa: message_fa.into(),
            retryable: None,
            details: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Internal error text attached to a response as an extension
///
/// Only the development error-details middleware reads it.
#[derive(Debug, Clone)]
pub struct ErrorDetails(pub String);

/// Why a request could not be authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization: Bearer` header
    MissingToken,
    /// Access token failed signature, expiry or format checks
    InvalidAccessToken,
    /// Refresh token failed verification or is no longer the live one
    InvalidRefreshToken,
    /// Login identifier or password did not match
    InvalidCredentials,
    /// A role-gated route was reached without an authenticated identity
    NotAuthenticated,
}

impl AuthFailure {
    pub fn messages(&self) -> (&'static str, &'static str) {
        match self {
            AuthFailure::MissingToken => ("Access token required", "توکن دسترسی الزامی است"),
            AuthFailure::InvalidAccessToken => (
                "Invalid or expired access token",
                "توکن دسترسی نامعتبر یا منقضی شده است",
            ),
            AuthFailure::InvalidRefreshToken => (
                "Invalid or expired refresh token, please log in again",
                "توکن تازه‌سازی نامعتبر یا منقضی شده است، لطفاً دوباره وارد شوید",
            ),
            AuthFailure::InvalidCredentials => (
                "Invalid username, email or password",
                "نام کاربری، ایمیل یا رمز عبور اشتباه است",
            ),
            AuthFailure::NotAuthenticated => ("Authentication required", "احراز هویت الزامی است"),
        }
    }
}

/// Why request input was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Body is not JSON or does not match the expected shape
    MalformedBody,
    InvalidUsername,
    InvalidEmail,
    InvalidFullName,
    /// A field failed validation and has no dedicated message
    InvalidField(String),
    WeakPassword(PasswordPolicy),
    UsernameTaken,
    EmailTaken,
    IncorrectCurrentPassword,
    PasswordUnchanged,
}

impl ValidationFailure {
    pub fn messages(&self) -> (String, String) {
        let (en, fa) = match self {
            ValidationFailure::MalformedBody => (
                "Request body is missing or malformed",
                "بدنه درخواست نامعتبر یا ناقص است",
            ),
            ValidationFailure::InvalidUsername => (
                "Username must be 3-30 characters of letters, digits, '_' or '.'",
                "نام کاربری باید ۳ تا ۳۰ کاراکتر و فقط شامل حروف، ارقام، '_' یا '.' باشد",
            ),
            ValidationFailure::InvalidEmail => ("Invalid email address", "آدرس ایمیل نامعتبر است"),
            ValidationFailure::InvalidFullName => (
                "Full name must be at most 100 characters",
                "نام کامل نباید بیشتر از ۱۰۰ کاراکتر باشد",
            ),
            ValidationFailure::InvalidField(field) => {
                return (
                    format!("Invalid value for field '{field}'"),
                    format!("مقدار فیلد '{field}' نامعتبر است"),
                )
            }
            ValidationFailure::WeakPassword(policy) => policy.messages(),
            ValidationFailure::UsernameTaken => (
                "Username is already taken",
                "این نام کاربری قبلاً ثبت شده است",
            ),
            ValidationFailure::EmailTaken => (
                "Email is already registered",
                "این ایمیل قبلاً ثبت شده است",
            ),
            ValidationFailure::IncorrectCurrentPassword => (
                "Current password is incorrect",
                "رمز عبور فعلی اشتباه است",
            ),
            ValidationFailure::PasswordUnchanged => (
                "New password must differ from the current password",
                "رمز عبور جدید باید با رمز عبور فعلی متفاوت باشد",
            ),
        };
        (en.to_string(), fa.to_string())
    }
}

/// Resource kinds that can be missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
}

impl Resource {
    fn messages(&self) -> (&'static str, &'static str) {
        match self {
            Resource::User => ("User not found", "کاربر یافت نشد"),
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication failed: {0:?}")]
    Authentication(AuthFailure),

    #[error("insufficient role")]
    Authorization,

    #[error("{0:?} not found")]
    NotFound(Resource),

    #[error("validation failed: {0:?}")]
    Validation(ValidationFailure),

    #[error("internal error: {detail}")]
    Internal { detail: String, retryable: bool },
}

impl AppError {
    /// Non-retryable internal error
    pub fn internal(detail: impl Into<String>) -> Self {
        AppError::Internal {
            detail: detail.into(),
            retryable: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::Authorization => "AUTHORIZATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (body, details) = match self {
            AppError::Authentication(failure) => {
                tracing::debug!(?failure, "Request not authenticated");
                let (en, fa) = failure.messages();
                (ApiError::new(code, en, fa), None)
            }
            AppError::Authorization => (
                ApiError::new(
                    code,
                    "You do not have permission to access this resource",
                    "شما اجازه دسترسی به این بخش را ندارید",
                ),
                None,
            ),
            AppError::NotFound(resource) => {
                let (en, fa) = resource.messages();
                (ApiError::new(code, en, fa), None)
            }
            AppError::Validation(failure) => {
                tracing::debug!(?failure, "Request input rejected");
                let (en, fa) = failure.messages();
                (ApiError::new(code, en, fa), None)
            }
            AppError::Internal { detail, retryable } => {
                tracing::error!(detail = %detail, retryable, "Internal server error");
                (
                    ApiError::new(code, "Internal server error", "خطای داخلی سرور")
                        .with_retryable(retryable),
                    Some(ErrorDetails(detail)),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(details) = details {
            response.extensions_mut().insert(details);
        }
        response
    }
}

impl From<UniworkError> for AppError {
    fn from(err: UniworkError) -> Self {
        match err {
            UniworkError::Conflict(constraint) if constraint.contains("email") => {
                AppError::Validation(ValidationFailure::EmailTaken)
            }
            UniworkError::Conflict(_) => AppError::Validation(ValidationFailure::UsernameTaken),
            UniworkError::NotFound(_) => AppError::NotFound(Resource::User),
            other => AppError::internal(other.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<PasswordPolicy> for AppError {
    fn from(policy: PasswordPolicy) -> Self {
        AppError::Validation(ValidationFailure::WeakPassword(policy))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
        AppError::Validation(ValidationFailure::MalformedBody)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort_unstable();

        let failure = match fields.first().map(String::as_str) {
            Some("username") => ValidationFailure::InvalidUsername,
            Some("email") => ValidationFailure::InvalidEmail,
            Some("full_name") => ValidationFailure::InvalidFullName,
            Some(other) => ValidationFailure::InvalidField(other.to_string()),
            None => ValidationFailure::MalformedBody,
        };
        AppError::Validation(failure)
    }
}
