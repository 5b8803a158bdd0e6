// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Incremental sync of the Spotify recently-played feed into the ledger.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::PlayRecord;
use crate::services::cache::{CacheInvalidator, SPOTIFY_TAG};
use crate::services::providers::Provider;
use crate::services::spotify::{RecentlyPlayedPage, SpotifyClient};
use crate::services::tokens::TokenManager;
use crate::time_utils::parse_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Upper bound on feed pages walked per run.
pub const MAX_SYNC_PAGES: u32 = 10;

/// A fetched window ending more than this after the newest stored play
/// means plays fell off the feed between runs.
pub const GAP_THRESHOLD_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SyncOutcome {
    /// Empty ledger: sync needs an import to anchor it.
    Skipped(SkippedSync),
    Completed(SyncReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSync {
    pub success: bool,
    pub skipped: bool,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    /// Plays fetched from the feed
    pub total: u32,
    pub inserted: u32,
    /// Plays already in the ledger, or without a usable track id
    pub skipped: u32,
    pub gap_detected: bool,
}

#[derive(Clone)]
pub struct SyncEngine {
    db: SqliteDb,
    tokens: TokenManager,
    spotify: SpotifyClient,
    invalidator: CacheInvalidator,
}

impl SyncEngine {
    pub fn new(
        db: SqliteDb,
        tokens: TokenManager,
        spotify: SpotifyClient,
        invalidator: CacheInvalidator,
    ) -> Self {
        Self {
            db,
            tokens,
            spotify,
            invalidator,
        }
    }

    pub async fn run(&self) -> Result<SyncOutcome, AppError> {
        let Some(newest_stored) = self.db.newest_played_at()? else {
            tracing::info!("Ledger is empty, skipping sync");
            return Ok(SyncOutcome::Skipped(SkippedSync {
                success: true,
                skipped: true,
                total: 0,
            }));
        };

        let mut fetched: Vec<PlayRecord> = Vec::new();
        let mut unusable = 0u32;
        let mut oldest_fetched: Option<DateTime<Utc>> = None;
        let mut before: Option<i64> = None;

        for page_number in 0..MAX_SYNC_PAGES {
            let page = self.fetch_page(before).await?;
            if page.items.is_empty() {
                break;
            }

            let mut page_oldest: Option<DateTime<Utc>> = None;
            for item in &page.items {
                let Some(played_at) = parse_utc_rfc3339(&item.played_at) else {
                    unusable += 1;
                    continue;
                };
                page_oldest = Some(page_oldest.map_or(played_at, |o| o.min(played_at)));

                match (item.track.id.clone(), item.track.links()) {
                    (Some(track_id), Some((album_id, artist_ids))) => fetched.push(PlayRecord {
                        played_at,
                        track_id,
                        album_id,
                        artist_ids,
                    }),
                    _ => unusable += 1,
                }
            }

            let Some(page_oldest) = page_oldest else {
                break;
            };
            oldest_fetched = Some(oldest_fetched.map_or(page_oldest, |o| o.min(page_oldest)));

            if page_oldest <= newest_stored {
                tracing::debug!(page = page_number, "Reached newest stored play");
                break;
            }

            before = page
                .cursors
                .as_ref()
                .and_then(|c| c.before.as_deref())
                .and_then(|b| b.parse().ok())
                .or(Some(page_oldest.timestamp_millis()));
        }

        let mut inserted = 0u32;
        let mut duplicates = 0u32;
        for play in &fetched {
            if self.db.insert_play(play)? {
                inserted += 1;
            } else {
                duplicates += 1;
            }
        }

        let gap_detected = oldest_fetched.is_some_and(|oldest| {
            oldest - newest_stored > Duration::minutes(GAP_THRESHOLD_MINUTES)
        });
        if gap_detected {
            tracing::warn!(
                newest_stored = %newest_stored,
                "Feed did not reach the newest stored play; plays may be missing"
            );
        }

        let report = SyncReport {
            success: true,
            total: fetched.len() as u32 + unusable,
            inserted,
            skipped: duplicates + unusable,
            gap_detected,
        };
        tracing::info!(
            total = report.total,
            inserted = report.inserted,
            skipped = report.skipped,
            gap_detected = report.gap_detected,
            "Sync complete"
        );

        if inserted > 0 {
            self.invalidator.invalidate(SPOTIFY_TAG).await;
        }
        Ok(SyncOutcome::Completed(report))
    }

    async fn fetch_page(&self, before: Option<i64>) -> Result<RecentlyPlayedPage, AppError> {
        let spotify = &self.spotify;
        self.tokens
            .call_with_token(Provider::Spotify, |token| async move {
                spotify.recently_played(&token, before).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_shapes() {
        let skipped = SyncOutcome::Skipped(SkippedSync {
            success: true,
            skipped: true,
            total: 0,
        });
        assert_eq!(
            serde_json::to_value(&skipped).unwrap(),
            serde_json::json!({"success": true, "skipped": true, "total": 0})
        );

        let done = SyncOutcome::Completed(SyncReport {
            success: true,
            total: 3,
            inserted: 2,
            skipped: 1,
            gap_detected: false,
        });
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            serde_json::json!({
                "success": true, "total": 3, "inserted": 2, "skipped": 1, "gapDetected": false
            })
        );
    }
}
