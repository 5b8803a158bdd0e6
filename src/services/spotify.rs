// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spotify Web API client.
//!
//! Handles:
//! - The recently-played feed (cursor paging)
//! - Batch and single track lookups for the enrichment cache

use crate::error::AppError;
use crate::models::{Album, Artist, Track, TrackMetadata};
use crate::services::http::{check_response_json, transport_error};
use serde::Deserialize;

/// Largest page the recently-played endpoint serves.
pub const RECENTLY_PLAYED_LIMIT: u32 = 50;

/// Most ids accepted by one `/tracks?ids=` call.
pub const TRACK_BATCH_SIZE: usize = 50;

const PROVIDER: &str = "spotify";

/// Spotify API client.
#[derive(Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for SpotifyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyClient {
    pub fn new() -> Self {
        Self::with_base_url("https://api.spotify.com/v1")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// One page of the recently-played feed, newest first, strictly before
    /// `before_ms` (Unix milliseconds) when given.
    pub async fn recently_played(
        &self,
        access_token: &str,
        before_ms: Option<i64>,
    ) -> Result<RecentlyPlayedPage, AppError> {
        let mut query = vec![("limit", RECENTLY_PLAYED_LIMIT.to_string())];
        if let Some(before) = before_ms {
            query.push(("before", before.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/me/player/recently-played", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(PROVIDER, response).await
    }

    /// Look up several tracks at once. Unknown ids come back as `None` in
    /// their position.
    pub async fn tracks(
        &self,
        access_token: &str,
        ids: &[String],
    ) -> Result<Vec<Option<SpotifyTrack>>, AppError> {
        if ids.len() > TRACK_BATCH_SIZE {
            return Err(AppError::BadRequest(format!(
                "At most {} track ids per lookup",
                TRACK_BATCH_SIZE
            )));
        }

        let response = self
            .http
            .get(format!("{}/tracks", self.base_url))
            .bearer_auth(access_token)
            .query(&[("ids", ids.join(","))])
            .send()
            .await
            .map_err(transport_error)?;

        let batch: TracksResponse = check_response_json(PROVIDER, response).await?;
        Ok(batch.tracks)
    }

    pub async fn track(&self, access_token: &str, id: &str) -> Result<SpotifyTrack, AppError> {
        let response = self
            .http
            .get(format!("{}/tracks/{}", self.base_url, urlencoding::encode(id)))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(PROVIDER, response).await
    }
}

/// Recently-played response page.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayedPage {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cursors {
    /// Unix milliseconds, as a string
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryItem {
    pub track: SpotifyTrack,
    pub played_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TracksResponse {
    tracks: Vec<Option<SpotifyTrack>>,
}

/// Track object. Local files have no id.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: String,
    pub album: SpotifyAlbum,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

impl SpotifyTrack {
    /// Album id and credited artist ids, in credit order.
    pub fn links(&self) -> Option<(String, Vec<String>)> {
        let album_id = self.album.id.clone()?;
        let artist_ids = self.artists.iter().filter_map(|a| a.id.clone()).collect();
        Some((album_id, artist_ids))
    }

    /// Convert to cache rows. `None` for tracks lacking a track, album, or
    /// artist id.
    pub fn to_metadata(&self) -> Option<TrackMetadata> {
        let id = self.id.clone()?;
        let album_id = self.album.id.clone()?;

        let artists: Vec<Artist> = self
            .artists
            .iter()
            .filter_map(|a| {
                Some(Artist {
                    id: a.id.clone()?,
                    name: a.name.clone(),
                    url: a.external_urls.spotify.clone(),
                })
            })
            .collect();
        if artists.is_empty() {
            return None;
        }

        Some(TrackMetadata {
            track: Track {
                id,
                name: self.name.clone(),
                album_id: album_id.clone(),
                url: self.external_urls.spotify.clone(),
            },
            album: Album {
                id: album_id,
                name: self.album.name.clone(),
                // Spotify lists the largest image first
                image_url: self.album.images.first().map(|i| i.url.clone()),
                url: self.album.external_urls.spotify.clone(),
            },
            artists,
        })
    }
}

/// Extract the bare id from a `spotify:track:<id>` URI. Bare ids pass through.
pub fn track_id_from_uri(uri: &str) -> Option<&str> {
    let id = match uri.strip_prefix("spotify:track:") {
        Some(id) => id,
        None if uri.contains(':') => return None,
        None => uri,
    };
    (!id.is_empty()).then_some(id)
}
