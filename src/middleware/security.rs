// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response hardening headers.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Path prefixes whose responses can carry token material or secrets.
const NO_STORE_PREFIXES: [&str; 3] = ["/admin", "/auth", "/cron"];

/// Add security headers to all responses, and forbid caching of
/// credential-bearing routes.
pub async fn add_security_headers(req: Request, next: Next) -> Response {
    let no_store = NO_STORE_PREFIXES
        .iter()
        .any(|prefix| req.uri().path().starts_with(prefix));

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    if no_store {
        headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    }

    response
}
