// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod catalog;
pub mod credential;
pub mod play;

pub use activity::ActivityRecord;
pub use catalog::{Album, Artist, Track, TrackArtist, TrackMetadata};
pub use credential::{Credential, HandshakeState, TokenStatus};
pub use play::PlayRecord;
