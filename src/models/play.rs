// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Listening history ledger records.

use chrono::{DateTime, Utc};

/// One play in the append-only ledger. `(played_at, track_id)` is the key.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRecord {
    pub played_at: DateTime<Utc>,
    pub track_id: String,
    pub album_id: String,
    /// Artist ids in credit order
    pub artist_ids: Vec<String>,
}
