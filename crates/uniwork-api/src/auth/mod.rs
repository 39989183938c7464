//! Authentication and authorization module
//!
//! - `jwt`: access/refresh token encoding and validation
//! - `password`: Argon2id hashing and password policy
//! - `token`: token service backed by the revocation store
//! - `middleware`: request authentication and role gating
//! - `service`: account operations

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

pub use jwt::{AccessClaims, JwtConfig, JwtError, RefreshClaims};
pub use middleware::{authenticate, authorize, AuthenticatedUser};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordPolicy};
pub use service::{
    AuthResponse, AuthService, ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, UpdateProfileRequest,
};
pub use token::{TokenPair, TokenService};
