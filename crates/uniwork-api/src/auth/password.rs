//! Password hashing and verification using Argon2id
//!
//! Hashing parameters follow OWASP recommendations:
//! - Algorithm: Argon2id
//! - Memory: 64 MB
//! - Iterations: 3
//! - Parallelism: 4 lanes
//! - Salt: random, embedded in the PHC string

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use std::sync::OnceLock;
use thiserror::Error;

const MIN_PASSWORD_CHARS: usize = 6;
const MAX_PASSWORD_CHARS: usize = 128;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2 cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a plaintext password with the default Argon2id parameters
///
/// Returns a PHC string (`$argon2id$v=19$m=65536,t=3,p=4$...`) that embeds
/// the salt, so it can be stored as-is.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password with custom parameters
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash
///
/// * `Ok(true)` - password matches
/// * `Ok(false)` - password does not match
/// * `Err(_)` - the stored hash is unreadable
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    // Parameters are read from the PHC string
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Stand-in hash verified when no account matches a login identifier
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| hash_password("uniwork-no-such-account-0").ok())
        .as_deref()
}

/// Run one full verification against a fixed hash and discard the outcome
///
/// Keeps the cost of a login for an unknown account equal to that of a
/// wrong password.
pub fn verify_dummy_password(password: &str) {
    if let Some(hash) = dummy_hash() {
        let _ = verify_password(password, hash);
    }
}

/// Reason a candidate password was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    TooShort,
    TooLong,
    MissingLetter,
    MissingDigit,
}

impl PasswordPolicy {
    /// English and Persian explanation
    pub fn messages(&self) -> (&'static str, &'static str) {
        match self {
            PasswordPolicy::TooShort => (
                "Password must be at least 6 characters long",
                "رمز عبور باید حداقل ۶ کاراکتر باشد",
            ),
            PasswordPolicy::TooLong => (
                "Password must be at most 128 characters long",
                "رمز عبور نباید بیشتر از ۱۲۸ کاراکتر باشد",
            ),
            PasswordPolicy::MissingLetter => (
                "Password must contain at least one letter",
                "رمز عبور باید حداقل شامل یک حرف باشد",
            ),
            PasswordPolicy::MissingDigit => (
                "Password must contain at least one digit",
                "رمز عبور باید حداقل شامل یک رقم باشد",
            ),
        }
    }
}

/// Check a password against the account policy
///
/// Length is counted in characters, and Persian letters and digits count
/// the same as ASCII ones.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordPolicy> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_CHARS {
        return Err(PasswordPolicy::TooShort);
    }
    if length > MAX_PASSWORD_CHARS {
        return Err(PasswordPolicy::TooLong);
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordPolicy::MissingLetter);
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err(PasswordPolicy::MissingDigit);
    }

    Ok(())
}
