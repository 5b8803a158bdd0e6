// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava activity model for storage.

use chrono::{DateTime, Utc};

/// Stored activity record.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    /// Strava activity ID
    pub id: u64,
    /// Start date/time of the activity
    pub activity_start_date: DateTime<Utc>,
    /// Full activity detail with camelCase keys
    pub activity_data: serde_json::Value,
    /// When the detail was last fetched from Strava
    pub last_update: DateTime<Utc>,
}
