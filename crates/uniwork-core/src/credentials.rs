//! Credential store
//!
//! Persists user identities and their password hashes. Two backends:
//! - [`PgCredentialStore`]: PostgreSQL via SQLx
//! - [`InMemoryCredentialStore`]: process-local map, used for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{normalize_email, Language, Result, UniworkError, User, UserRole};

/// Trait for user record storage
///
/// Store internals stay opaque to callers: a missing record is `Ok(None)`,
/// a unique-key clash is [`UniworkError::Conflict`], anything else is a
/// store-level error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a user whose username or email matches `identifier`
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>>;

    /// Find a user by identifier
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Insert a new user
    async fn create(&self, user: User) -> Result<User>;

    /// Persist every mutable field of an existing user
    async fn save(&self, user: &User) -> Result<()>;

    /// List users, oldest first
    async fn list(&self, limit: i64) -> Result<Vec<User>>;

    /// Round-trip to the backend
    async fn health_check(&self) -> Result<()>;

    /// Release backend resources
    async fn close(&self) {}

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL credential store
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Open a connection pool.
    ///
    /// Connections are checked before being handed out and re-established
    /// lazily, so a database restart heals on the next acquire.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table if it does not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                full_name TEXT,
                preferred_language TEXT NOT NULL DEFAULT 'fa',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_login_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| UniworkError::DatabaseError(format!("Failed to create users table: {e}")))?;

        Ok(())
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    full_name: Option<String>,
    preferred_language: String,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = UniworkError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<UserRole>()?,
            full_name: row.full_name,
            preferred_language: row.preferred_language.parse::<Language>()?,
            created_at: row.created_at,
            last_login_at: row.last_login_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, full_name, preferred_language, created_at, last_login_at";

fn map_write_error(e: sqlx::Error, action: &str) -> UniworkError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            UniworkError::Conflict(db.constraint().unwrap_or("users").to_string())
        }
        _ => UniworkError::DatabaseError(format!("Failed to {action}: {e}")),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        );
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(identifier.trim())
            .bind(normalize_email(identifier))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn create(&self, user: User) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, password_hash, role,
                full_name, preferred_language, created_at, last_login_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.full_name)
        .bind(user.preferred_language.as_str())
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "create user"))?;

        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                password_hash = $4,
                role = $5,
                full_name = $6,
                preferred_language = $7,
                last_login_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.full_name)
        .bind(user.preferred_language.as_str())
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "save user"))?;

        if result.rows_affected() == 0 {
            return Err(UniworkError::NotFound(format!("user {}", user.id)));
        }

        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC LIMIT $1");
        let rows: Vec<UserRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Failed to list users: {e}")))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| UniworkError::DatabaseError(format!("Health check failed: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local credential store
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clashes(existing: &User, candidate: &User) -> Option<&'static str> {
    if existing.id == candidate.id {
        return None;
    }
    if existing.username == candidate.username {
        Some("users_username_key")
    } else if existing.email == candidate.email {
        Some("users_email_key")
    } else {
        None
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>> {
        let username = identifier.trim();
        let email = normalize_email(identifier);
        let users = self.users.read().await;

        Ok(users
            .values()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.id) {
            return Err(UniworkError::Conflict("users_pkey".to_string()));
        }
        if let Some(constraint) = users.values().find_map(|u| clashes(u, &user)) {
            return Err(UniworkError::Conflict(constraint.to_string()));
        }

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id) {
            return Err(UniworkError::NotFound(format!("user {}", user.id)));
        }
        if let Some(constraint) = users.values().find_map(|u| clashes(u, user)) {
            return Err(UniworkError::Conflict(constraint.to_string()));
        }

        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list(&self, limit: i64) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by_key(|u| u.created_at);
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User::new("alice", "a@x.com", "hash".to_string())
    }

    #[tokio::test]
    async fn test_find_by_username_or_email() {
        let store = InMemoryCredentialStore::new();
        let user = store.create(alice()).await.unwrap();

        let by_name = store.find_by_username_or_email("alice").await.unwrap();
        let by_email = store.find_by_username_or_email(" A@X.COM ").await.unwrap();
        let missing = store.find_by_username_or_email("bob").await.unwrap();

        assert_eq!(by_name.unwrap().id, user.id);
        assert_eq!(by_email.unwrap().id, user.id);
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_conflict() {
        let store = InMemoryCredentialStore::new();
        store.create(alice()).await.unwrap();

        let same_name = User::new("alice", "other@x.com", "hash".to_string());
        let same_email = User::new("alice2", "a@x.com", "hash".to_string());

        assert!(matches!(
            store.create(same_name).await,
            Err(UniworkError::Conflict(c)) if c == "users_username_key"
        ));
        assert!(matches!(
            store.create(same_email).await,
            Err(UniworkError::Conflict(c)) if c == "users_email_key"
        ));
    }

    #[tokio::test]
    async fn test_save_updates_existing_record() {
        let store = InMemoryCredentialStore::new();
        let mut user = store.create(alice()).await.unwrap();

        user.password_hash = "new-hash".to_string();
        user.last_login_at = Some(Utc::now());
        store.save(&user).await.unwrap();

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
        assert!(reloaded.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_save_unknown_user_is_not_found() {
        let store = InMemoryCredentialStore::new();
        let result = store.save(&alice()).await;
        assert!(matches!(result, Err(UniworkError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_rejects_email_taken_by_other_user() {
        let store = InMemoryCredentialStore::new();
        store.create(alice()).await.unwrap();
        let mut bob = store
            .create(User::new("bob", "b@x.com", "hash".to_string()))
            .await
            .unwrap();

        bob.email = "a@x.com".to_string();
        assert!(matches!(
            store.save(&bob).await,
            Err(UniworkError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let store = InMemoryCredentialStore::new();
        for i in 0..3 {
            store
                .create(User::new(&format!("user{i}"), &format!("u{i}@x.com"), "h".to_string()))
                .await
                .unwrap();
        }

        assert_eq!(store.list(2).await.unwrap().len(), 2);
        assert_eq!(store.list(10).await.unwrap().len(), 3);
    }
}
