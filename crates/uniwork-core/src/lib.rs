//! UniWork Core - Domain models, configuration and store contracts
//!
//! This crate defines the core abstractions shared by the UniWork services:
//! - User identity model (accounts, roles, preferred language)
//! - Common error types
//! - Configuration management
//! - Credential store (user records)
//! - Revocation store (live refresh tokens)

pub mod config;
pub mod credentials;
pub mod revocation;
pub mod timeout;

pub use config::{
    AdminBootstrap, AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig,
    ServerConfig, StoreBackend,
};
pub use credentials::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
pub use revocation::{refresh_token_key, MokaRevocationStore, PgRevocationStore, RevocationStore};
pub use timeout::with_timeout;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for UniWork store and domain operations
#[derive(Error, Debug)]
pub enum UniworkError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Store operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

pub type Result<T> = std::result::Result<T, UniworkError>;

// ============================================================================
// Identity
// ============================================================================

/// User role
///
/// The set is closed: every account is either a standard user or an
/// administrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = UniworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(UniworkError::ValidationError(format!("unknown role '{other}'"))),
        }
    }
}

/// Interface language preferred by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fa,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Fa => "fa",
            Language::En => "en",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = UniworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fa" => Ok(Language::Fa),
            "en" => Ok(Language::En),
            other => Err(UniworkError::ValidationError(format!(
                "unknown language '{other}'"
            ))),
        }
    }
}

/// User account record as held by the credential store
///
/// `password_hash` is an Argon2id PHC string and is never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub full_name: Option<String>,
    #[serde(default)]
    pub preferred_language: Language,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new standard user with a fresh identifier.
    ///
    /// Username is trimmed, email is trimmed and lowercased.
    pub fn new(username: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            role: UserRole::User,
            full_name: None,
            preferred_language: Language::default(),
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.preferred_language = language;
        self
    }

    /// Public representation without the password hash
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            full_name: self.full_name.clone(),
            preferred_language: self.preferred_language,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// User profile safe for API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub preferred_language: Language,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Trim and lowercase an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Tests
// ============================================================================
