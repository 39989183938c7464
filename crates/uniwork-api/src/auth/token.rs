//! Token service
//!
//! Issues and verifies access/refresh token pairs. Access tokens are checked
//! by signature and expiry alone. A refresh token is only accepted while it
//! is the exact value stored under `refresh_token:<user id>`, so each user
//! has at most one live refresh token and the latest issue wins.

use super::jwt::{
    generate_access_token, generate_refresh_token, validate_access_token, validate_refresh_token,
    AccessClaims, JwtConfig, JwtError, RefreshClaims,
};
use crate::audit::{audit_log, AuditEvent, RefreshRejection};
use crate::error::{AppError, AuthFailure};
use std::sync::Arc;
use std::time::Duration;
use uniwork_core::{refresh_token_key, with_timeout, RevocationStore, User};
use uuid::Uuid;

/// Access and refresh token issued together
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

pub struct TokenService {
    config: JwtConfig,
    revocations: Arc<dyn RevocationStore>,
    op_timeout: Duration,
}

impl TokenService {
    pub fn new(
        config: JwtConfig,
        revocations: Arc<dyn RevocationStore>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            config,
            revocations,
            op_timeout,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign an access token for `user`
    pub fn issue_access_token(&self, user: &User) -> Result<String, AppError> {
        generate_access_token(&self.config, user.id, &user.username, &user.email, user.role)
            .map_err(|e| AppError::internal(format!("Failed to sign access token: {e}")))
    }

    /// Check an access token's signature and expiry; no store lookup
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        validate_access_token(&self.config, token).map_err(|e| {
            tracing::debug!(reason = e.reason(), "Access token rejected");
            AppError::Authentication(AuthFailure::InvalidAccessToken)
        })
    }

    /// Sign a refresh token for `user_id` and record it as the user's live token
    ///
    /// If the store write fails or times out no token is returned.
    pub async fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let token = generate_refresh_token(&self.config, user_id)
            .map_err(|e| AppError::internal(format!("Failed to sign refresh token: {e}")))?;

        let key = refresh_token_key(user_id);
        with_timeout(
            "revocation.set",
            self.op_timeout,
            self.revocations
                .set(&key, &token, self.config.refresh_expiration_secs),
        )
        .await?;

        Ok(token)
    }

    /// Cryptographic and temporal check of a refresh token, without the store
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        validate_refresh_token(&self.config, token).map_err(|e| {
            let reason = match e {
                JwtError::ExpiredToken => RefreshRejection::Expired,
                _ => RefreshRejection::Malformed,
            };
            reject_refresh(None, reason)
        })
    }

    /// Verify a refresh token and confirm it is the user's live token
    ///
    /// The signature check always runs before the store lookup.
    pub async fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let claims = self.decode_refresh_token(token)?;
        let user_id = claims
            .user_id()
            .map_err(|_| reject_refresh(None, RefreshRejection::Malformed))?;

        let key = refresh_token_key(user_id);
        let stored = with_timeout("revocation.get", self.op_timeout, self.revocations.get(&key))
            .await?;

        match stored {
            Some(live) if live == token => Ok(claims),
            Some(_) => Err(reject_refresh(Some(user_id), RefreshRejection::Superseded)),
            None => Err(reject_refresh(Some(user_id), RefreshRejection::Revoked)),
        }
    }

    /// Drop the user's live refresh token; idempotent
    pub async fn invalidate_refresh_token(&self, user_id: Uuid) -> Result<(), AppError> {
        let key = refresh_token_key(user_id);
        with_timeout("revocation.del", self.op_timeout, self.revocations.del(&key)).await?;
        Ok(())
    }

    /// Issue a fresh access token and replace the live refresh token
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = self.issue_access_token(user)?;
        let refresh_token = self.issue_refresh_token(user.id).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_expiration_secs,
        })
    }
}

fn reject_refresh(user_id: Option<Uuid>, reason: RefreshRejection) -> AppError {
    audit_log(&AuditEvent::RefreshRejected {
        user_id,
        reason,
        ip_address: None,
    });
    AppError::Authentication(AuthFailure::InvalidRefreshToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uniwork_core::{MokaRevocationStore, UniworkError};

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-for-tests".to_string(),
            access_expiration_secs: 900,
            refresh_secret: "refresh-secret-for-tests".to_string(),
            refresh_expiration_secs: 3600,
            issuer: "uniwork-api".to_string(),
        }
    }

    fn service() -> TokenService {
        TokenService::new(
            test_config(),
            Arc::new(MokaRevocationStore::default()),
            Duration::from_secs(1),
        )
    }

    fn alice() -> User {
        User::new("alice", "a@x.com", "hash".to_string())
    }

    /// Store whose writes never finish in time
    struct StalledStore;

    #[async_trait]
    impl RevocationStore for StalledStore {
        async fn get(&self, _key: &str) -> uniwork_core::Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> uniwork_core::Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
        async fn del(&self, _key: &str) -> uniwork_core::Result<()> {
            Ok(())
        }
        async fn health_check(&self) -> uniwork_core::Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "stalled"
        }
    }

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl RevocationStore for BrokenStore {
        async fn get(&self, _key: &str) -> uniwork_core::Result<Option<String>> {
            Err(UniworkError::DatabaseError("connection reset".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> uniwork_core::Result<()> {
            Err(UniworkError::DatabaseError("connection reset".to_string()))
        }
        async fn del(&self, _key: &str) -> uniwork_core::Result<()> {
            Err(UniworkError::DatabaseError("connection reset".to_string()))
        }
        async fn health_check(&self) -> uniwork_core::Result<()> {
            Err(UniworkError::DatabaseError("connection reset".to_string()))
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let user = alice();

        let token = service.issue_access_token(&user).unwrap();
        let claims = service.verify_access_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_access_token_rejects_garbage() {
        let result = service().verify_access_token("not-a-token");
        assert!(matches!(
            result,
            Err(AppError::Authentication(AuthFailure::InvalidAccessToken))
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_round_trip() {
        let service = service();
        let user_id = Uuid::new_v4();

        let token = service.issue_refresh_token(user_id).await.unwrap();
        let claims = service.verify_refresh_token(&token).await.unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_second_issue_supersedes_first() {
        let service = service();
        let user_id = Uuid::new_v4();

        let first = service.issue_refresh_token(user_id).await.unwrap();
        let second = service.issue_refresh_token(user_id).await.unwrap();

        assert!(matches!(
            service.verify_refresh_token(&first).await,
            Err(AppError::Authentication(AuthFailure::InvalidRefreshToken))
        ));
        assert!(service.verify_refresh_token(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let service = service();
        let user_id = Uuid::new_v4();
        let token = service.issue_refresh_token(user_id).await.unwrap();

        service.invalidate_refresh_token(user_id).await.unwrap();
        service.invalidate_refresh_token(user_id).await.unwrap();

        assert!(service.verify_refresh_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_regardless_of_store() {
        let store: Arc<dyn RevocationStore> = Arc::new(MokaRevocationStore::default());
        let user_id = Uuid::new_v4();

        let other = TokenService::new(
            JwtConfig {
                refresh_secret: "someone-elses-secret".to_string(),
                ..test_config()
            },
            store.clone(),
            Duration::from_secs(1),
        );
        // Stored under the right key, signed with the wrong secret
        let forged = other.issue_refresh_token(user_id).await.unwrap();

        let service = TokenService::new(test_config(), store, Duration::from_secs(1));
        assert!(service.verify_refresh_token(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_issue_token_pair() {
        let service = service();
        let user = alice();

        let pair = service.issue_token_pair(&user).await.unwrap();

        assert_eq!(pair.expires_in, 900);
        assert!(service.verify_access_token(&pair.access_token).is_ok());
        assert!(service.verify_refresh_token(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_timeout_aborts_issuance() {
        let service = TokenService::new(
            test_config(),
            Arc::new(StalledStore),
            Duration::from_millis(20),
        );

        let result = service.issue_refresh_token(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(AppError::Internal {
                retryable: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_store_error_aborts_issuance() {
        let service = TokenService::new(test_config(), Arc::new(BrokenStore), Duration::from_secs(1));

        assert!(matches!(
            service.issue_token_pair(&alice()).await,
            Err(AppError::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_signature_skips_store_lookup() {
        // A store lookup here would fail with an internal error instead
        let service = TokenService::new(test_config(), Arc::new(BrokenStore), Duration::from_secs(1));

        let result = service.verify_refresh_token("garbage").await;
        assert!(matches!(
            result,
            Err(AppError::Authentication(AuthFailure::InvalidRefreshToken))
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_fails_while_stored() {
        let store = Arc::new(MokaRevocationStore::default());
        let service = TokenService::new(test_config(), store.clone(), Duration::from_secs(1));
        let user_id = Uuid::new_v4();

        let now = chrono::Utc::now().timestamp() as u64;
        let claims = RefreshClaims {
            iss: "uniwork-api".to_string(),
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
            token_type: crate::auth::jwt::REFRESH_TOKEN_TYPE.to_string(),
        };
        let expired = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(test_config().refresh_secret.as_bytes()),
        )
        .unwrap();

        store
            .set(&refresh_token_key(user_id), &expired, 3600)
            .await
            .unwrap();

        assert!(matches!(
            service.decode_refresh_token(&expired),
            Err(AppError::Authentication(AuthFailure::InvalidRefreshToken))
        ));
        assert!(matches!(
            service.verify_refresh_token(&expired).await,
            Err(AppError::Authentication(AuthFailure::InvalidRefreshToken))
        ));
        assert_eq!(
            store.get(&refresh_token_key(user_id)).await.unwrap(),
            Some(expired)
        );
    }
}
