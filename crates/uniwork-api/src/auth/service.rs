//! Authentication service layer
//!
//! Account operations behind the `/auth` and `/admin` endpoints:
//! registration, login, token refresh, logout, profile management and
//! password change. Every credential store call is bounded by the
//! configured store timeout.

use super::middleware::AuthenticatedUser;
use super::password::{
    hash_password, validate_password_strength, verify_dummy_password, verify_password,
};
use super::token::{TokenPair, TokenService};
use crate::audit::{audit_log, AuditEvent, RefreshRejection, RequestMeta};
use crate::error::{AppError, AuthFailure, Resource, ValidationFailure};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uniwork_core::{
    normalize_email, with_timeout, AdminBootstrap, CredentialStore, Language, User, UserPublic,
    UserRole,
};
use uuid::Uuid;
use validator::Validate;

/// Upper bound on users returned by the admin listing
pub const ADMIN_LIST_LIMIT: i64 = 500;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 30;

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    pub preferred_language: Option<Language>,
}

/// User login request
///
/// The identifier may be a username or an email address.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    #[validate(length(min = 1))]
    pub identifier: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Profile update request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub preferred_language: Option<Language>,
}

/// Password change request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    pub new_password: String,
}

/// Authentication response with tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserPublic,
}

impl AuthResponse {
    fn new(pair: TokenPair, user: &User) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
            user: user.to_public(),
        }
    }
}

/// Username rules: 3-30 ASCII letters, digits, `_` or `.`
pub fn validate_username(username: &str) -> Result<(), AppError> {
    let length = username.chars().count();
    let allowed = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if (USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&length) && allowed {
        Ok(())
    } else {
        Err(AppError::Validation(ValidationFailure::InvalidUsername))
    }
}

/// Authentication service
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    op_timeout: Duration,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            tokens,
            op_timeout,
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, AppError> {
        with_timeout(
            "credentials.find_by_id",
            self.op_timeout,
            self.credentials.find_by_id(user_id),
        )
        .await?
        .ok_or(AppError::NotFound(Resource::User))
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        with_timeout("credentials.save", self.op_timeout, self.credentials.save(user)).await?;
        Ok(())
    }

    /// Register a new standard user and sign them in
    pub async fn register(
        &self,
        mut request: RegisterRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, AppError> {
        request.username = request.username.trim().to_string();
        request.email = normalize_email(&request.email);
        let (username, email) = (request.username.clone(), request.email.clone());

        let checked = request
            .validate()
            .map_err(AppError::from)
            .and_then(|_| validate_username(&username))
            .and_then(|_| validate_password_strength(&request.password).map_err(AppError::from));
        if let Err(e) = checked {
            audit_registration_failure(&username, &email, &e, meta);
            return Err(e);
        }

        let password_hash = hash_password(&request.password)?;

        let mut user = User::new(&username, &email, password_hash)
            .with_language(request.preferred_language.unwrap_or_default());
        if let Some(full_name) = request.full_name.map(|n| n.trim().to_string()) {
            if !full_name.is_empty() {
                user = user.with_full_name(full_name);
            }
        }

        // No account is stored unless its tokens were issued
        let pair = self.tokens.issue_token_pair(&user).await?;

        let user_id = user.id;
        let user = match with_timeout("credentials.create", self.op_timeout, self.credentials.create(user))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                if let Err(cleanup) = self.tokens.invalidate_refresh_token(user_id).await {
                    tracing::warn!(user_id = %user_id, error = %cleanup, "Orphan refresh token left to expire");
                }
                let e = AppError::from(e);
                audit_registration_failure(&username, &email, &e, meta);
                return Err(e);
            }
        };

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        });
        tracing::info!(user_id = %user.id, username = %user.username, "User registered");

        Ok(AuthResponse::new(pair, &user))
    }

    /// Log in with a username or email and password
    ///
    /// Unknown identifiers and wrong passwords produce the same error.
    pub async fn login(
        &self,
        request: LoginRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, AppError> {
        request.validate()?;
        let identifier = request.identifier.trim();

        let found = with_timeout(
            "credentials.find_by_username_or_email",
            self.op_timeout,
            self.credentials.find_by_username_or_email(identifier),
        )
        .await?;

        let Some(mut user) = found else {
            verify_dummy_password(&request.password);
            audit_login_failure(identifier, "unknown identifier", meta);
            return Err(AppError::Authentication(AuthFailure::InvalidCredentials));
        };

        if !verify_password(&request.password, &user.password_hash)? {
            audit_login_failure(identifier, "wrong password", meta);
            return Err(AppError::Authentication(AuthFailure::InvalidCredentials));
        }

        user.last_login_at = Some(Utc::now());
        self.save_user(&user).await?;

        let pair = self.tokens.issue_token_pair(&user).await?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            username: user.username.clone(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        });

        Ok(AuthResponse::new(pair, &user))
    }

    /// Exchange the live refresh token for a new token pair
    ///
    /// The presented refresh token stops working once the new one is stored.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        meta: &RequestMeta,
    ) -> Result<AuthResponse, AppError> {
        request.validate()?;

        let claims = self.tokens.verify_refresh_token(&request.refresh_token).await?;
        let user_id = claims
            .user_id()
            .map_err(|_| AppError::Authentication(AuthFailure::InvalidRefreshToken))?;
        let user = self.load_user(user_id).await?;

        let pair = self.tokens.issue_token_pair(&user).await?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        });

        Ok(AuthResponse::new(pair, &user))
    }

    /// Revoke the caller's refresh token
    ///
    /// The presented token only has to be a genuine refresh token for the
    /// caller; it need not be the live one, so repeating a logout succeeds.
    pub async fn logout(
        &self,
        caller: &AuthenticatedUser,
        request: LogoutRequest,
        meta: &RequestMeta,
    ) -> Result<(), AppError> {
        request.validate()?;

        let claims = self.tokens.decode_refresh_token(&request.refresh_token)?;
        if claims.user_id().ok() != Some(caller.user_id) {
            audit_log(&AuditEvent::RefreshRejected {
                user_id: Some(caller.user_id),
                reason: RefreshRejection::OwnerMismatch,
                ip_address: meta.ip_address.clone(),
            });
            return Err(AppError::Authentication(AuthFailure::InvalidRefreshToken));
        }

        self.tokens.invalidate_refresh_token(caller.user_id).await?;

        audit_log(&AuditEvent::Logout {
            user_id: caller.user_id,
            ip_address: meta.ip_address.clone(),
        });

        Ok(())
    }

    /// Current profile of `user_id`
    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserPublic, AppError> {
        Ok(self.load_user(user_id).await?.to_public())
    }

    /// Apply a partial profile update
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        mut request: UpdateProfileRequest,
    ) -> Result<UserPublic, AppError> {
        request.email = request.email.as_deref().map(normalize_email);
        request.validate()?;
        let mut user = self.load_user(user_id).await?;

        if let Some(full_name) = request.full_name {
            let full_name = full_name.trim();
            user.full_name = (!full_name.is_empty()).then(|| full_name.to_string());
        }
        if let Some(email) = request.email {
            user.email = email;
        }
        if let Some(language) = request.preferred_language {
            user.preferred_language = language;
        }

        self.save_user(&user).await?;
        tracing::debug!(user_id = %user.id, "Profile updated");

        Ok(user.to_public())
    }

    /// Change the caller's password and revoke their refresh token
    pub async fn change_password(
        &self,
        caller: &AuthenticatedUser,
        request: ChangePasswordRequest,
        meta: &RequestMeta,
    ) -> Result<(), AppError> {
        request.validate()?;
        validate_password_strength(&request.new_password)?;

        let mut user = self.load_user(caller.user_id).await?;

        if !verify_password(&request.current_password, &user.password_hash)? {
            return Err(AppError::Validation(
                ValidationFailure::IncorrectCurrentPassword,
            ));
        }
        if request.current_password == request.new_password {
            return Err(AppError::Validation(ValidationFailure::PasswordUnchanged));
        }

        // Revoke first: a failure here leaves the old password in place
        self.tokens.invalidate_refresh_token(user.id).await?;
        user.password_hash = hash_password(&request.new_password)?;
        self.save_user(&user).await?;

        audit_log(&AuditEvent::PasswordChange {
            user_id: user.id,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
        });

        Ok(())
    }

    /// Create the configured administrator unless it already exists
    ///
    /// An existing administrator is left untouched. A standard account
    /// holding the name is never promoted.
    pub async fn ensure_admin(&self, admin: &AdminBootstrap) -> Result<UserPublic, AppError> {
        let request = RegisterRequest {
            username: admin.username.trim().to_string(),
            email: normalize_email(&admin.email),
            password: admin.password.clone(),
            full_name: None,
            preferred_language: None,
        };

        let existing = with_timeout(
            "credentials.find_by_username_or_email",
            self.op_timeout,
            self.credentials.find_by_username_or_email(&request.username),
        )
        .await?;
        if let Some(user) = existing {
            if user.role == UserRole::Admin {
                tracing::debug!(username = %user.username, "Administrator account present");
                return Ok(user.to_public());
            }
            tracing::error!(
                username = %user.username,
                "Administrator name belongs to a standard account"
            );
            return Err(AppError::Validation(ValidationFailure::UsernameTaken));
        }

        request.validate()?;
        validate_username(&request.username)?;
        validate_password_strength(&request.password)?;

        let user = User::new(
            &request.username,
            &request.email,
            hash_password(&request.password)?,
        )
        .with_role(UserRole::Admin);
        let user = with_timeout("credentials.create", self.op_timeout, self.credentials.create(user))
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "Administrator account created");
        Ok(user.to_public())
    }

    /// All accounts, oldest first, capped at [`ADMIN_LIST_LIMIT`]
    pub async fn list_users(&self) -> Result<Vec<UserPublic>, AppError> {
        let users = with_timeout(
            "credentials.list",
            self.op_timeout,
            self.credentials.list(ADMIN_LIST_LIMIT),
        )
        .await?;

        Ok(users.iter().map(User::to_public).collect())
    }
}

fn audit_login_failure(identifier: &str, reason: &str, meta: &RequestMeta) {
    audit_log(&AuditEvent::LoginFailure {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
    });
}

fn audit_registration_failure(username: &str, email: &str, error: &AppError, meta: &RequestMeta) {
    audit_log(&AuditEvent::RegistrationFailure {
        username: username.to_string(),
        email: email.to_string(),
        reason: error.to_string(),
        ip_address: meta.ip_address.clone(),
    });
}
