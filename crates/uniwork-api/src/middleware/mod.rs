//! HTTP middleware applied to the whole router
//!
//! Authentication and role gating live in [`crate::auth::middleware`].

pub mod error_details;
pub mod security_headers;

pub use error_details::expose_error_details;
pub use security_headers::security_headers_middleware;
