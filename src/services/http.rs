// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response checks shared by the provider API clients.

use crate::error::AppError;
use serde::de::DeserializeOwned;

/// Check response status and return an error if not successful.
///
/// 429 and 401 get their own variants so callers can apply the rate-limit
/// retry and the forced-refresh retry respectively.
pub async fn check_response(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            tracing::warn!(provider, "Provider rate limit hit (429)");
            Err(AppError::RateLimited)
        }
        401 => Err(AppError::ProviderUnauthorized),
        404 => Err(AppError::NotFound(format!("{} resource", provider))),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::ProviderApi(format!("HTTP {}: {}", status, body)))
        }
    }
}

/// Check response and parse JSON body.
pub async fn check_response_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(provider, response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::ProviderApi(format!("JSON parse error: {}", e)))
}

pub fn transport_error(err: reqwest::Error) -> AppError {
    AppError::ProviderApi(err.to_string())
}
