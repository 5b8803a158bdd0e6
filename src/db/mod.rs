//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::SqliteDb;

/// Table names as constants.
pub mod tables {
    pub const CREDENTIALS: &str = "credentials";
    pub const OAUTH_STATES: &str = "oauth_states";
    /// Listening history ledger, keyed by (played_at, track_id)
    pub const PLAYS: &str = "plays";
    pub const ACTIVITIES: &str = "activities";
    pub const ARTISTS: &str = "artists";
    pub const ALBUMS: &str = "albums";
    pub const TRACKS: &str = "tracks";
    pub const TRACK_ARTISTS: &str = "track_artists";
}
