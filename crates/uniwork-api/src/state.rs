//! Application state management
//!
//! Both stores are opened once at startup, shared through [`AppState`] and
//! closed by [`AppState::shutdown`].

use crate::auth::{AuthService, JwtConfig, TokenService};
use crate::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use uniwork_core::{
    with_timeout, AppConfig, CredentialStore, InMemoryCredentialStore, MokaRevocationStore,
    PgCredentialStore, PgRevocationStore, RevocationStore, StoreBackend, UniworkError,
};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    pub credentials: Arc<dyn CredentialStore>,
    pub revocations: Arc<dyn RevocationStore>,
    pub tokens: Arc<TokenService>,
    pub auth: Arc<AuthService>,
}

/// Outcome of pinging both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub credentials: bool,
    pub revocations: bool,
}

impl StoreHealth {
    pub fn all_ok(&self) -> bool {
        self.credentials && self.revocations
    }
}

impl AppState {
    /// Wire services around already-open stores
    pub fn with_stores(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        let op_timeout = config.database.operation_timeout();
        let tokens = Arc::new(TokenService::new(
            JwtConfig::from(&config.auth),
            revocations.clone(),
            op_timeout,
        ));
        let auth = Arc::new(AuthService::new(
            credentials.clone(),
            tokens.clone(),
            op_timeout,
        ));

        Self {
            config,
            start_time: Instant::now(),
            credentials,
            revocations,
            tokens,
            auth,
        }
    }

    /// Process-local stores; nothing survives a restart
    pub fn in_memory(config: AppConfig) -> Self {
        let revocations = MokaRevocationStore::new(config.database.revocation_capacity);
        Self::with_stores(
            config,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(revocations),
        )
    }

    /// Open the configured backend and make sure its schema exists
    pub async fn connect(config: AppConfig) -> Result<Self, UniworkError> {
        match config.database.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory stores; accounts are lost on restart");
                Ok(Self::in_memory(config))
            }
            StoreBackend::Postgres => {
                let credentials = PgCredentialStore::connect(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.operation_timeout(),
                )
                .await?;
                credentials.ensure_schema().await?;

                let revocations = PgRevocationStore::from_pool(credentials.pool().clone());
                revocations.ensure_schema().await?;
                let purged = revocations.purge_expired().await?;
                tracing::info!(purged, "Connected to PostgreSQL");

                Ok(Self::with_stores(
                    config,
                    Arc::new(credentials),
                    Arc::new(revocations),
                ))
            }
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Ping both stores, each bounded by the store timeout
    pub async fn check_stores(&self) -> StoreHealth {
        let timeout = self.config.database.operation_timeout();
        let (credentials, revocations) = tokio::join!(
            with_timeout("credentials.health_check", timeout, self.credentials.health_check()),
            with_timeout("revocation.health_check", timeout, self.revocations.health_check()),
        );

        if let Err(e) = &credentials {
            tracing::warn!(store = self.credentials.name(), error = %e, "Credential store unhealthy");
        }
        if let Err(e) = &revocations {
            tracing::warn!(store = self.revocations.name(), error = %e, "Revocation store unhealthy");
        }

        StoreHealth {
            credentials: credentials.is_ok(),
            revocations: revocations.is_ok(),
        }
    }

    /// Create the configured administrator account, if one is configured
    pub async fn bootstrap_admin(&self) -> Result<(), AppError> {
        if let Some(admin) = &self.config.auth.bootstrap_admin {
            self.auth.ensure_admin(admin).await?;
        }
        Ok(())
    }

    /// Close both stores
    pub async fn shutdown(&self) {
        self.revocations.close().await;
        self.credentials.close().await;
        tracing::info!("Stores closed");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(AppConfig::default())
    }
}
