// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, security).

pub mod bearer;
pub mod security;

pub use bearer::{require_admin_secret, require_cron_secret};
