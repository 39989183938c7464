//! JWT token generation and validation
//!
//! Two token kinds, both HMAC-SHA256:
//! - access tokens carry the user's identity and role and are never persisted
//! - refresh tokens carry only the subject and a `token_type` discriminator and
//!   are signed with a separate secret
//!
//! Validation uses zero clock leeway.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uniwork_core::{AuthConfig, UserRole};
use uuid::Uuid;

/// Discriminator carried by every refresh token
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims embedded in an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique token identifier
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

/// Claims embedded in a refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iss: String,
    pub sub: String,
    /// Keeps two tokens minted in the same second distinct
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
    /// Always [`REFRESH_TOKEN_TYPE`]
    pub token_type: String,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token is not a refresh token")]
    WrongTokenType,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

impl JwtError {
    /// Short label for logs
    pub fn reason(&self) -> &'static str {
        match self {
            JwtError::ExpiredToken => "expired",
            JwtError::InvalidSignature => "bad_signature",
            JwtError::WrongTokenType => "wrong_type",
            JwtError::InvalidToken => "malformed",
            JwtError::EncodingError(_) | JwtError::SystemTimeError(_) => "internal",
        }
    }
}

/// Signing keys and lifetimes for both token kinds
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    pub refresh_secret: String,
    /// Refresh token lifetime in seconds
    pub refresh_expiration_secs: u64,
    pub issuer: String,
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            access_secret: auth.access_secret.clone(),
            access_expiration_secs: auth.access_ttl_secs,
            refresh_secret: auth.refresh_secret.clone(),
            refresh_expiration_secs: auth.refresh_ttl_secs,
            issuer: auth.issuer.clone(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn validation(issuer: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> JwtError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    }
}

/// Generate a signed access token
///
/// # Example
///
/// ```no_run
/// use uniwork_api::auth::jwt::{generate_access_token, JwtConfig};
/// use uniwork_core::UserRole;
/// use uuid::Uuid;
///
/// let config = JwtConfig::default();
/// let token = generate_access_token(
///     &config,
///     Uuid::new_v4(),
///     "alice",
///     "a@x.com",
///     UserRole::User,
/// ).expect("Failed to generate token");
/// ```
pub fn generate_access_token(
    config: &JwtConfig,
    user_id: Uuid,
    username: &str,
    email: &str,
    role: UserRole,
) -> Result<String, JwtError> {
    let now = now_secs()?;

    let claims = AccessClaims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.access_expiration_secs,
        username: username.to_string(),
        email: email.to_string(),
        role,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.access_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate an access token's signature, issuer and expiry
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<AccessClaims, JwtError> {
    let token_data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.access_secret.as_bytes()),
        &validation(&config.issuer),
    )
    .map_err(map_decode_error)?;

    Ok(token_data.claims)
}

/// Generate a signed refresh token for `user_id`
///
/// This only encodes the token; recording it as the user's live refresh
/// token is the caller's job.
pub fn generate_refresh_token(config: &JwtConfig, user_id: Uuid) -> Result<String, JwtError> {
    let now = now_secs()?;

    let claims = RefreshClaims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.refresh_expiration_secs,
        token_type: REFRESH_TOKEN_TYPE.to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.refresh_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a refresh token's signature, issuer, expiry and discriminator
pub fn validate_refresh_token(config: &JwtConfig, token: &str) -> Result<RefreshClaims, JwtError> {
    let token_data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.refresh_secret.as_bytes()),
        &validation(&config.issuer),
    )
    .map_err(map_decode_error)?;

    if token_data.claims.token_type != REFRESH_TOKEN_TYPE {
        return Err(JwtError::WrongTokenType);
    }

    Ok(token_data.claims)
}
