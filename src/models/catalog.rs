// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Catalog metadata cached from Spotify. Rows are immutable once written.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album_id: String,
    pub url: Option<String>,
}

/// Join row linking a track to an artist at a credit position.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackArtist {
    pub track_id: String,
    pub artist_id: String,
    pub position: u32,
}

/// Everything the cache knows about one track, resolved for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub track: Track,
    pub album: Album,
    /// In credit order
    pub artists: Vec<Artist>,
}
