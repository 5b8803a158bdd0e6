// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bulk import of a Spotify streaming-history archive into the ledger.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::PlayRecord;
use crate::services::cache::{CacheInvalidator, SPOTIFY_TAG};
use crate::services::providers::Provider;
use crate::services::spotify::{track_id_from_uri, SpotifyClient, SpotifyTrack, TRACK_BATCH_SIZE};
use crate::services::tokens::TokenManager;
use crate::time_utils::parse_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use validator::Validate;

/// One archive entry. Both the extended export naming (`spotify_track_uri`,
/// `ms_played`) and the camelCase naming are accepted.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ArchiveEntry {
    #[validate(length(min = 1, max = 64))]
    pub ts: String,

    #[serde(default, rename = "spotify_track_uri", alias = "trackUri")]
    #[validate(length(max = 256))]
    pub track_uri: Option<String>,

    #[serde(default, rename = "ms_played", alias = "playedDuration")]
    pub ms_played: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Entry {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error(transparent)]
    App(#[from] AppError),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::InvalidEntry { .. } => "invalid-entry",
            ImportError::App(AppError::NotConnected(_)) => "not-connected",
            ImportError::App(_) => "import-failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: u32,
    pub skipped: u32,
    pub errors: u32,
    pub failed_track_ids: Vec<String>,
}

/// A validated entry.
struct Candidate {
    played_at: DateTime<Utc>,
    track_id: Option<String>,
}

#[derive(Clone)]
pub struct HistoryImporter {
    db: SqliteDb,
    tokens: TokenManager,
    spotify: SpotifyClient,
    invalidator: CacheInvalidator,
    retry_delay: Duration,
}

impl HistoryImporter {
    pub fn new(
        db: SqliteDb,
        tokens: TokenManager,
        spotify: SpotifyClient,
        invalidator: CacheInvalidator,
        retry_delay: Duration,
    ) -> Self {
        Self {
            db,
            tokens,
            spotify,
            invalidator,
            retry_delay,
        }
    }

    /// Import an archive. Every entry is validated before anything is
    /// fetched or written; one bad entry rejects the whole archive.
    pub async fn import(
        &self,
        entries: &[ArchiveEntry],
        dry_run: bool,
    ) -> Result<ImportReport, ImportError> {
        let candidates = validate_all(entries)?;
        let mut report = ImportReport::default();

        let tracked: Vec<(DateTime<Utc>, String)> = candidates
            .into_iter()
            .filter_map(|c| match c.track_id {
                Some(id) => Some((c.played_at, id)),
                None => {
                    report.skipped += 1;
                    None
                }
            })
            .collect();

        // Pairs already in the ledger are silent no-ops.
        let mut pending = Vec::with_capacity(tracked.len());
        for (played_at, track_id) in tracked {
            if !self.db.play_exists(played_at, &track_id)? {
                pending.push((played_at, track_id));
            }
        }

        if dry_run {
            report.imported = pending.len() as u32;
            tracing::info!(imported = report.imported, skipped = report.skipped, "Dry-run import");
            return Ok(report);
        }

        let mut links: HashMap<String, (String, Vec<String>)> = HashMap::new();
        let mut unresolved: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for (_, track_id) in &pending {
            if !seen.insert(track_id.clone()) {
                continue;
            }
            match self.db.ledger_track_links(track_id)? {
                Some(found) => {
                    links.insert(track_id.clone(), found);
                }
                None => unresolved.push(track_id.clone()),
            }
        }

        let mut failed: HashSet<String> = HashSet::new();
        for batch in unresolved.chunks(TRACK_BATCH_SIZE) {
            match self.lookup_batch(batch).await {
                Ok(tracks) => {
                    for (id, track) in batch.iter().zip(tracks) {
                        match track.as_ref().and_then(SpotifyTrack::links) {
                            Some(found) => {
                                if let Some(meta) = track.as_ref().and_then(SpotifyTrack::to_metadata) {
                                    self.db.store_track_metadata(&meta)?;
                                }
                                links.insert(id.clone(), found);
                            }
                            None => {
                                failed.insert(id.clone());
                            }
                        }
                    }
                }
                Err(e @ AppError::NotConnected(_)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(batch_size = batch.len(), error = %e, "Track batch lookup failed");
                    failed.extend(batch.iter().cloned());
                }
            }
        }

        for (played_at, track_id) in pending {
            let Some((album_id, artist_ids)) = links.get(&track_id) else {
                report.errors += 1;
                continue;
            };
            let inserted = self.db.insert_play(&PlayRecord {
                played_at,
                track_id,
                album_id: album_id.clone(),
                artist_ids: artist_ids.clone(),
            })?;
            if inserted {
                report.imported += 1;
            }
        }

        let mut failed_track_ids: Vec<String> = failed.into_iter().collect();
        failed_track_ids.sort();
        report.failed_track_ids = failed_track_ids;

        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            errors = report.errors,
            "History import complete"
        );
        if report.imported > 0 {
            self.invalidator.invalidate(SPOTIFY_TAG).await;
        }
        Ok(report)
    }

    /// Batch lookup, retried exactly once after a rate limit.
    async fn lookup_batch(&self, ids: &[String]) -> Result<Vec<Option<SpotifyTrack>>, AppError> {
        match self.lookup_once(ids).await {
            Err(AppError::RateLimited) => {
                tracing::info!(delay_ms = self.retry_delay.as_millis() as u64, "Rate limited, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.lookup_once(ids).await
            }
            other => other,
        }
    }

    async fn lookup_once(&self, ids: &[String]) -> Result<Vec<Option<SpotifyTrack>>, AppError> {
        let spotify = &self.spotify;
        self.tokens
            .call_with_token(Provider::Spotify, |token| async move {
                spotify.tracks(&token, ids).await
            })
            .await
    }
}

fn validate_all(entries: &[ArchiveEntry]) -> Result<Vec<Candidate>, ImportError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let invalid = |reason: String| ImportError::InvalidEntry { index, reason };

            entry.validate().map_err(|e| invalid(e.to_string()))?;
            let played_at = parse_utc_rfc3339(&entry.ts)
                .ok_or_else(|| invalid(format!("ts is not RFC 3339: {}", entry.ts)))?;
            let track_id = match entry.track_uri.as_deref() {
                None | Some("") => None,
                Some(uri) => Some(
                    track_id_from_uri(uri)
                        .ok_or_else(|| invalid(format!("not a track URI: {}", uri)))?
                        .to_string(),
                ),
            };

            Ok(Candidate {
                played_at,
                track_id,
            })
        })
        .collect()
}
