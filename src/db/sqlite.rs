// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Credentials (one OAuth token set per provider)
//! - OAuth handshake states (single-use)
//! - The play ledger (insert-or-ignore on `(played_at, track_id)`)
//! - Activities (upsert/delete by Strava id)
//! - The catalog enrichment cache (artists, albums, tracks, track_artists)
//!
//! Uniqueness constraints are the only concurrency guard: two writers racing on
//! the same key both succeed and the table still holds one row.

use crate::db::tables;
use crate::error::AppError;
use crate::models::{
    ActivityRecord, Album, Artist, Credential, HandshakeState, PlayRecord, Track, TrackMetadata,
};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    name TEXT PRIMARY KEY,
    access_token TEXT,
    refresh_token TEXT,
    expiry_at TEXT
);
CREATE TABLE IF NOT EXISTS oauth_states (
    state TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    code_verifier TEXT,
    expires_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS plays (
    played_at TEXT NOT NULL,
    track_id TEXT NOT NULL,
    album_id TEXT NOT NULL,
    artist_ids TEXT NOT NULL,
    PRIMARY KEY (played_at, track_id)
);
CREATE INDEX IF NOT EXISTS idx_plays_track_id ON plays(track_id);
CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY,
    activity_start_date TEXT NOT NULL,
    activity_data TEXT NOT NULL,
    last_update TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS artists (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT
);
CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    image_url TEXT,
    url TEXT
);
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    album_id TEXT NOT NULL,
    url TEXT
);
CREATE TABLE IF NOT EXISTS track_artists (
    track_id TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (track_id, artist_id)
);
"#;

/// SQLite database client.
#[derive(Clone)]
pub struct SqliteDb {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDb {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;
        tracing::info!(path = %path.display(), "Opened SQLite database");
        Self::with_connection(conn)
    }

    /// Create a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Database(format!("Failed to create schema: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Database("Connection mutex poisoned".to_string()))
    }

    // ─── Credential Operations ───────────────────────────────────

    /// Get the stored credential for a provider.
    pub fn get_credential(&self, name: &str) -> Result<Option<Credential>, AppError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT name, access_token, refresh_token, expiry_at FROM {} WHERE name = ?1",
                    tables::CREDENTIALS
                ),
                params![name],
                |row| {
                    let expiry_at: Option<String> = row.get(3)?;
                    Ok(Credential {
                        name: row.get(0)?,
                        access_token: row.get(1)?,
                        refresh_token: row.get(2)?,
                        expiry_at: expiry_at.as_deref().and_then(parse_utc_rfc3339),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Create or replace the credential for a provider.
    pub fn upsert_credential(&self, credential: &Credential) -> Result<(), AppError> {
        self.conn()?.execute(
            &format!(
                "INSERT INTO {} (name, access_token, refresh_token, expiry_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expiry_at = excluded.expiry_at",
                tables::CREDENTIALS
            ),
            params![
                credential.name,
                credential.access_token,
                credential.refresh_token,
                credential.expiry_at.map(format_utc_rfc3339),
            ],
        )?;
        Ok(())
    }

    // ─── Handshake State Operations ──────────────────────────────

    pub fn insert_state(&self, state: &HandshakeState) -> Result<(), AppError> {
        self.conn()?.execute(
            &format!(
                "INSERT INTO {} (state, provider, code_verifier, expires_at) VALUES (?1, ?2, ?3, ?4)",
                tables::OAUTH_STATES
            ),
            params![
                state.state,
                state.provider,
                state.code_verifier,
                format_utc_rfc3339(state.expires_at),
            ],
        )?;
        Ok(())
    }

    /// Remove a state row and return it if it had not yet expired.
    ///
    /// The row is deleted whether or not it is still valid, so a state value
    /// can never be redeemed twice.
    pub fn take_state(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<HandshakeState>, AppError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                &format!(
                    "SELECT state, provider, code_verifier, expires_at FROM {} WHERE state = ?1",
                    tables::OAUTH_STATES
                ),
                params![state],
                |row| {
                    let expires_at: String = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        expires_at,
                    ))
                },
            )
            .optional()?;

        let deleted = tx.execute(
            &format!("DELETE FROM {} WHERE state = ?1", tables::OAUTH_STATES),
            params![state],
        )?;
        tx.commit()?;

        // A concurrent completion deleted it first.
        if deleted == 0 {
            return Ok(None);
        }

        let Some((state, provider, code_verifier, expires_at)) = row else {
            return Ok(None);
        };
        let Some(expires_at) = parse_utc_rfc3339(&expires_at) else {
            return Ok(None);
        };
        if expires_at <= now {
            return Ok(None);
        }

        Ok(Some(HandshakeState {
            state,
            provider,
            code_verifier,
            expires_at,
        }))
    }

    /// Delete expired handshake states. Returns the number removed.
    pub fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let removed = self.conn()?.execute(
            &format!("DELETE FROM {} WHERE expires_at <= ?1", tables::OAUTH_STATES),
            params![format_utc_rfc3339(now)],
        )?;
        Ok(removed)
    }

    // ─── Play Ledger Operations ──────────────────────────────────

    pub fn count_plays(&self) -> Result<u64, AppError> {
        let count: i64 = self.conn()?.query_row(
            &format!("SELECT COUNT(*) FROM {}", tables::PLAYS),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Timestamp of the most recent play in the ledger.
    pub fn newest_played_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let raw: Option<String> = self.conn()?.query_row(
            &format!("SELECT MAX(played_at) FROM {}", tables::PLAYS),
            [],
            |row| row.get(0),
        )?;
        Ok(raw.as_deref().and_then(parse_utc_rfc3339))
    }

    /// Insert a play unless its key already exists. Returns whether a row
    /// was written.
    pub fn insert_play(&self, play: &PlayRecord) -> Result<bool, AppError> {
        let artist_ids = serde_json::to_string(&play.artist_ids)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode artists: {}", e)))?;
        let inserted = self.conn()?.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (played_at, track_id, album_id, artist_ids)
                 VALUES (?1, ?2, ?3, ?4)",
                tables::PLAYS
            ),
            params![
                format_utc_rfc3339(play.played_at),
                play.track_id,
                play.album_id,
                artist_ids,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn play_exists(&self, played_at: DateTime<Utc>, track_id: &str) -> Result<bool, AppError> {
        let found = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE played_at = ?1 AND track_id = ?2",
                    tables::PLAYS
                ),
                params![format_utc_rfc3339(played_at), track_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Album and artist ids recorded for a track by any earlier play.
    pub fn ledger_track_links(
        &self,
        track_id: &str,
    ) -> Result<Option<(String, Vec<String>)>, AppError> {
        let row = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT album_id, artist_ids FROM {} WHERE track_id = ?1 LIMIT 1",
                    tables::PLAYS
                ),
                params![track_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((album_id, artist_ids)) => Ok(Some((album_id, decode_artist_ids(&artist_ids)?))),
            None => Ok(None),
        }
    }

    /// Plays strictly older than `before` (or the newest plays if `None`),
    /// newest first. A full page is extended with any remaining rows sharing
    /// its last `played_at`, so a timestamp cursor never splits a tie.
    pub fn plays_before(
        &self,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<PlayRecord>, AppError> {
        let conn = self.conn()?;
        let before = before.map(format_utc_rfc3339);
        let mut plays = query_plays(
            &conn,
            &format!(
                "SELECT played_at, track_id, album_id, artist_ids FROM {}
                 WHERE ?1 IS NULL OR played_at < ?1
                 ORDER BY played_at DESC, track_id ASC
                 LIMIT ?2",
                tables::PLAYS
            ),
            params![before, limit],
        )?;

        if plays.len() as u32 == limit {
            if let Some(last) = plays.last() {
                let ties = query_plays(
                    &conn,
                    &format!(
                        "SELECT played_at, track_id, album_id, artist_ids FROM {}
                         WHERE played_at = ?1 AND track_id > ?2
                         ORDER BY track_id ASC",
                        tables::PLAYS
                    ),
                    params![format_utc_rfc3339(last.played_at), last.track_id],
                )?;
                plays.extend(ties);
            }
        }
        Ok(plays)
    }

    // ─── Activity Operations ─────────────────────────────────────

    pub fn get_activity(&self, id: u64) -> Result<Option<ActivityRecord>, AppError> {
        let row = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT activity_start_date, activity_data, last_update FROM {} WHERE id = ?1",
                    tables::ACTIVITIES
                ),
                params![id as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((start, data, last_update)) = row else {
            return Ok(None);
        };

        let corrupt = |field: &str| AppError::Database(format!("Corrupt {} for activity {}", field, id));
        Ok(Some(ActivityRecord {
            id,
            activity_start_date: parse_utc_rfc3339(&start)
                .ok_or_else(|| corrupt("activity_start_date"))?,
            activity_data: serde_json::from_str(&data).map_err(|_| corrupt("activity_data"))?,
            last_update: parse_utc_rfc3339(&last_update).ok_or_else(|| corrupt("last_update"))?,
        }))
    }

    pub fn upsert_activity(&self, activity: &ActivityRecord) -> Result<(), AppError> {
        self.conn()?.execute(
            &format!(
                "INSERT INTO {} (id, activity_start_date, activity_data, last_update)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    activity_start_date = excluded.activity_start_date,
                    activity_data = excluded.activity_data,
                    last_update = excluded.last_update",
                tables::ACTIVITIES
            ),
            params![
                activity.id as i64,
                format_utc_rfc3339(activity.activity_start_date),
                activity.activity_data.to_string(),
                format_utc_rfc3339(activity.last_update),
            ],
        )?;
        Ok(())
    }

    /// Delete an activity. Returns whether a row existed.
    pub fn delete_activity(&self, id: u64) -> Result<bool, AppError> {
        let deleted = self.conn()?.execute(
            &format!("DELETE FROM {} WHERE id = ?1", tables::ACTIVITIES),
            params![id as i64],
        )?;
        Ok(deleted > 0)
    }

    // ─── Catalog Cache Operations ────────────────────────────────

    /// Resolve a track from the cache tables. Returns `None` unless the track,
    /// its album, and at least one credited artist are all present.
    pub fn get_track_metadata(&self, track_id: &str) -> Result<Option<TrackMetadata>, AppError> {
        let conn = self.conn()?;

        let track = conn
            .query_row(
                &format!(
                    "SELECT id, name, album_id, url FROM {} WHERE id = ?1",
                    tables::TRACKS
                ),
                params![track_id],
                |row| {
                    Ok(Track {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        album_id: row.get(2)?,
                        url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        let Some(track) = track else {
            return Ok(None);
        };

        let album = conn
            .query_row(
                &format!(
                    "SELECT id, name, image_url, url FROM {} WHERE id = ?1",
                    tables::ALBUMS
                ),
                params![track.album_id],
                |row| {
                    Ok(Album {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        image_url: row.get(2)?,
                        url: row.get(3)?,
                    })
                },
            )
            .optional()?;
        let Some(album) = album else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT a.id, a.name, a.url FROM {} ta
             JOIN {} a ON a.id = ta.artist_id
             WHERE ta.track_id = ?1
             ORDER BY ta.position ASC",
            tables::TRACK_ARTISTS,
            tables::ARTISTS
        ))?;
        let artists = stmt
            .query_map(params![track_id], |row| {
                Ok(Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if artists.is_empty() {
            return Ok(None);
        }

        Ok(Some(TrackMetadata {
            track,
            album,
            artists,
        }))
    }

    /// Write all four cache tables for one track in a single transaction.
    /// Existing rows are left untouched.
    pub fn store_track_metadata(&self, meta: &TrackMetadata) -> Result<(), AppError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (id, name, image_url, url) VALUES (?1, ?2, ?3, ?4)",
                tables::ALBUMS
            ),
            params![meta.album.id, meta.album.name, meta.album.image_url, meta.album.url],
        )?;
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (id, name, album_id, url) VALUES (?1, ?2, ?3, ?4)",
                tables::TRACKS
            ),
            params![meta.track.id, meta.track.name, meta.track.album_id, meta.track.url],
        )?;
        for (position, artist) in meta.artists.iter().enumerate() {
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (id, name, url) VALUES (?1, ?2, ?3)",
                    tables::ARTISTS
                ),
                params![artist.id, artist.name, artist.url],
            )?;
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (track_id, artist_id, position) VALUES (?1, ?2, ?3)",
                    tables::TRACK_ARTISTS
                ),
                params![meta.track.id, artist.id, position as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn query_plays(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PlayRecord>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut plays = Vec::new();
    for row in rows {
        let (played_at, track_id, album_id, artist_ids) = row?;
        let played_at = parse_utc_rfc3339(&played_at).ok_or_else(|| {
            AppError::Database(format!("Corrupt played_at value: {}", played_at))
        })?;
        plays.push(PlayRecord {
            played_at,
            track_id,
            album_id,
            artist_ids: decode_artist_ids(&artist_ids)?,
        });
    }
    Ok(plays)
}

fn decode_artist_ids(raw: &str) -> Result<Vec<String>, AppError> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Database(format!("Corrupt artist_ids value: {}", e)))
}
