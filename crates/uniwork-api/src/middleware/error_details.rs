//! Development-only error details
//!
//! Internal errors keep their detail text in an [`ErrorDetails`] response
//! extension. This middleware, installed only when the server runs in the
//! development environment, copies it into the JSON body's `details` field.

use crate::error::{ApiError, ErrorDetails};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Error bodies are small; anything larger is passed through untouched
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

pub async fn expose_error_details(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;

    let Some(ErrorDetails(detail)) = response.extensions().get::<ErrorDetails>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Could not buffer error body");
            return parts.status.into_response();
        }
    };

    match serde_json::from_slice::<ApiError>(&bytes) {
        Ok(error) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            let rebuilt = Json(error.with_details(detail)).into_response();
            Response::from_parts(parts, rebuilt.into_body())
        }
        Err(_) => Response::from_parts(parts, Body::from(bytes)),
    }
}
