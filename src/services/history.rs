// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Enriched listening-history pages backed by the read-through cache.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::{Album, Artist, Track, TrackMetadata};
use crate::services::providers::Provider;
use crate::services::spotify::{SpotifyClient, SpotifyTrack};
use crate::services::tokens::TokenManager;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub plays: Vec<EnrichedPlay>,
    /// `playedAt` of the oldest row when the page was full
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPlay {
    pub played_at: String,
    pub track: Track,
    pub album: Album,
    pub artists: Vec<Artist>,
}

#[derive(Clone)]
pub struct HistoryReader {
    db: SqliteDb,
    tokens: TokenManager,
    spotify: SpotifyClient,
    retry_delay: Duration,
}

impl HistoryReader {
    pub fn new(
        db: SqliteDb,
        tokens: TokenManager,
        spotify: SpotifyClient,
        retry_delay: Duration,
    ) -> Self {
        Self {
            db,
            tokens,
            spotify,
            retry_delay,
        }
    }

    /// Ledger rows strictly older than `before`, newest first, each joined
    /// with cached metadata. Cache misses are fetched and written through.
    pub async fn page(
        &self,
        before: Option<DateTime<Utc>>,
        page_size: Option<u32>,
    ) -> Result<HistoryPage, AppError> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let rows = self.db.plays_before(before, page_size)?;

        let mut plays = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(meta) = self.resolve(&row.track_id).await? else {
                tracing::warn!(track_id = %row.track_id, "No metadata for track, omitting");
                continue;
            };
            plays.push(EnrichedPlay {
                played_at: format_utc_rfc3339(row.played_at),
                track: meta.track,
                album: meta.album,
                artists: meta.artists,
            });
        }

        // Ties at the page boundary may push past `page_size`.
        let next_cursor = if rows.len() as u32 >= page_size {
            rows.last().map(|r| format_utc_rfc3339(r.played_at))
        } else {
            None
        };

        Ok(HistoryPage { plays, next_cursor })
    }

    /// Cached metadata, or a fetch written through on a miss. Tracks the
    /// provider no longer serves resolve to `None`.
    async fn resolve(&self, track_id: &str) -> Result<Option<TrackMetadata>, AppError> {
        if let Some(meta) = self.db.get_track_metadata(track_id)? {
            return Ok(Some(meta));
        }

        tracing::debug!(track_id, "Metadata cache miss");
        let track = match self.fetch_track(track_id).await {
            Err(AppError::RateLimited) => {
                tracing::info!(
                    track_id,
                    delay_ms = self.retry_delay.as_millis() as u64,
                    "Rate limited, retrying once"
                );
                tokio::time::sleep(self.retry_delay).await;
                self.fetch_track(track_id).await
            }
            other => other,
        };
        let track = match track {
            Ok(track) => track,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(meta) = track.to_metadata() else {
            return Ok(None);
        };
        self.db.store_track_metadata(&meta)?;
        Ok(Some(meta))
    }

    async fn fetch_track(&self, track_id: &str) -> Result<SpotifyTrack, AppError> {
        let spotify = &self.spotify;
        self.tokens
            .call_with_token(Provider::Spotify, |token| async move {
                spotify.track(&token, track_id).await
            })
            .await
    }
}
