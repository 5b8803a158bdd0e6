// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret bearer authentication for scheduler and admin routes.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <CRON_SECRET>` for `/cron/*` routes.
pub async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_bearer(request.headers(), state.config.cron_secret.as_deref(), "cron")?;
    Ok(next.run(request).await)
}

/// Require `Authorization: Bearer <ADMIN_SECRET>` for `/admin/*` routes.
pub async fn require_admin_secret(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_bearer(request.headers(), state.config.admin_secret.as_deref(), "admin")?;
    Ok(next.run(request).await)
}

/// Compare the presented bearer token against `expected` in constant time.
/// An unset secret rejects every request.
pub fn check_bearer(headers: &HeaderMap, expected: Option<&str>, scope: &str) -> Result<(), AppError> {
    let Some(expected) = expected else {
        tracing::error!(scope, "Bearer secret not configured, rejecting request");
        return Err(AppError::Unauthorized);
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!(scope, "Rejected request with wrong bearer secret");
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_matching_secret_passes() {
        assert!(check_bearer(&headers("Bearer s3cret"), Some("s3cret"), "cron").is_ok());
    }

    #[test]
    fn test_wrong_or_malformed_secret_fails() {
        assert!(check_bearer(&headers("Bearer s3cre"), Some("s3cret"), "cron").is_err());
        assert!(check_bearer(&headers("Basic s3cret"), Some("s3cret"), "cron").is_err());
        assert!(check_bearer(&HeaderMap::new(), Some("s3cret"), "cron").is_err());
    }

    #[test]
    fn test_unset_secret_rejects_everything() {
        assert!(check_bearer(&headers("Bearer "), None, "admin").is_err());
    }
}
