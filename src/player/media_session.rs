//! Bridge to the OS-level "now playing" surface.
//!
//! Metadata and playback state are pushed out through `MediaSession`; hardware
//! keys come back in as `MediaCommand`s that the session routes to its own
//! operations.

use crate::api::models::Track;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
    pub duration: Option<f64>,
}

impl From<&Track> for MediaMetadata {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork: track.thumbnail.clone(),
            duration: track.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaPlaybackState {
    None,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action", content = "seekTime")]
pub enum MediaCommand {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    SeekTo(f64),
}

pub trait MediaSession: Send + Sync {
    fn set_metadata(&self, metadata: &MediaMetadata);
    fn set_playback_state(&self, state: MediaPlaybackState);
    fn clear(&self);
}

pub struct NoopMediaSession;

impl MediaSession for NoopMediaSession {
    fn set_metadata(&self, _metadata: &MediaMetadata) {}
    fn set_playback_state(&self, _state: MediaPlaybackState) {}
    fn clear(&self) {}
}

/// Logs every push. Handy when no OS integration is wired up.
pub struct LoggingMediaSession;

impl MediaSession for LoggingMediaSession {
    fn set_metadata(&self, metadata: &MediaMetadata) {
        log::debug!("Now playing: {} - {}", metadata.artist, metadata.title);
    }

    fn set_playback_state(&self, state: MediaPlaybackState) {
        log::debug!("Now playing state: {:?}", state);
    }

    fn clear(&self) {
        log::debug!("Now playing cleared");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSessionEvent {
    Metadata(MediaMetadata),
    State(MediaPlaybackState),
    Cleared,
}

/// Keeps every push in order.
#[derive(Default)]
pub struct RecordingMediaSession {
    events: Mutex<Vec<MediaSessionEvent>>,
}

impl RecordingMediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MediaSessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_state(&self) -> Option<MediaPlaybackState> {
        self.events().into_iter().rev().find_map(|e| match e {
            MediaSessionEvent::State(state) => Some(state),
            _ => None,
        })
    }

    fn push(&self, event: MediaSessionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl MediaSession for RecordingMediaSession {
    fn set_metadata(&self, metadata: &MediaMetadata) {
        self.push(MediaSessionEvent::Metadata(metadata.clone()));
    }

    fn set_playback_state(&self, state: MediaPlaybackState) {
        self.push(MediaSessionEvent::State(state));
    }

    fn clear(&self) {
        self.push(MediaSessionEvent::Cleared);
    }
}
