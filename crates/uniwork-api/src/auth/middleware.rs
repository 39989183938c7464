//! Authentication middleware for protecting routes
//!
//! `authenticate` verifies the bearer access token and attaches the caller's
//! identity to request extensions. `authorize` then restricts a route to a
//! set of roles. Failures propagate as errors; there is no anonymous
//! fallback.

use super::jwt::AccessClaims;
use crate::audit::{audit_log, AuditEvent, RequestMeta};
use crate::error::{AppError, AuthFailure};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uniwork_core::UserRole;
use uuid::Uuid;

/// Authenticated user information extracted from the access token
///
/// Handlers read it with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    /// Access token ID
    pub jti: String,
}

impl AuthenticatedUser {
    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }
}

impl TryFrom<AccessClaims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: AccessClaims) -> Result<Self, Self::Error> {
        let user_id = claims
            .user_id()
            .map_err(|_| AppError::Authentication(AuthFailure::InvalidAccessToken))?;

        Ok(Self {
            user_id,
            username: claims.username,
            email: claims.email,
            role: claims.role,
            jti: claims.jti,
        })
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use uniwork_api::auth::middleware::authenticate;
///
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));
/// ```
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(&request) else {
        return Err(AppError::Authentication(AuthFailure::MissingToken));
    };

    let user = match state
        .tokens
        .verify_access_token(token)
        .and_then(AuthenticatedUser::try_from)
    {
        Ok(user) => user,
        Err(e) => {
            let meta = RequestMeta::from_headers(request.headers());
            audit_log(&AuditEvent::InvalidToken {
                reason: e.to_string(),
                ip_address: meta.ip_address,
                user_agent: meta.user_agent,
            });
            return Err(e);
        }
    };

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// Middleware factory restricting a route to `allowed_roles`
///
/// Must run after [`authenticate`]. Admins are not let through implicitly;
/// list `UserRole::Admin` to admit them.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use uniwork_api::auth::middleware::{authenticate, authorize};
/// use uniwork_core::UserRole;
///
/// let app = Router::new()
///     .route("/admin/users", get(list_users_handler))
///     .route_layer(middleware::from_fn(authorize(&[UserRole::Admin])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));
/// ```
pub fn authorize(
    allowed_roles: &'static [UserRole],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Authentication(AuthFailure::NotAuthenticated))?;

            if !user.has_any_role(allowed_roles) {
                let meta = RequestMeta::from_headers(request.headers());
                audit_log(&AuditEvent::AccessDenied {
                    user_id: user.user_id,
                    role: user.role.to_string(),
                    resource: request.uri().path().to_string(),
                    required_roles: allowed_roles.iter().map(|r| r.to_string()).collect(),
                    ip_address: meta.ip_address,
                });

                return Err(AppError::Authorization);
            }

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    fn claims(role: UserRole) -> AccessClaims {
        AccessClaims {
            iss: "uniwork-api".to_string(),
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: 1000,
            exp: 2000,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let claims = claims(UserRole::Admin);
        let sub = claims.sub.clone();

        let user = AuthenticatedUser::try_from(claims).unwrap();

        assert_eq!(user.user_id.to_string(), sub);
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_bad_subject_is_rejected() {
        let mut claims = claims(UserRole::User);
        claims.sub = "not-a-uuid".to_string();

        assert!(matches!(
            AuthenticatedUser::try_from(claims),
            Err(AppError::Authentication(AuthFailure::InvalidAccessToken))
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let with = |value: &str| {
            HttpRequest::builder()
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap()
        };

        assert_eq!(bearer_token(&with("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&with("Basic abc")), None);
        assert_eq!(bearer_token(&with("Bearer ")), None);
        assert_eq!(bearer_token(&HttpRequest::new(Body::empty())), None);
    }

    fn gated_router(user: Option<AuthenticatedUser>) -> Router {
        let router = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(authorize(&[UserRole::Admin])));

        match user {
            Some(user) => router.layer(Extension(user)),
            None => router,
        }
    }

    fn user_with(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser::try_from(claims(role)).unwrap()
    }

    #[tokio::test]
    async fn test_authorize_admits_listed_role() {
        let response = gated_router(Some(user_with(UserRole::Admin)))
            .oneshot(HttpRequest::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_authorize_rejects_other_roles() {
        let response = gated_router(Some(user_with(UserRole::User)))
            .oneshot(HttpRequest::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authorize_without_identity_is_unauthenticated() {
        let response = gated_router(None)
            .oneshot(HttpRequest::get("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_is_not_implicitly_allowed() {
        let router = Router::new()
            .route("/students", get(|| async { "ok" }))
            .route_layer(middleware::from_fn(authorize(&[UserRole::User])))
            .layer(Extension(user_with(UserRole::Admin)));

        let response = router
            .oneshot(HttpRequest::get("/students").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
