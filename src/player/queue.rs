use crate::api::models::Track;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::Off,
        }
    }
}

/// Ordered tracks plus a cursor at the one last handed to playback.
///
/// Cursor moves never wrap and never look at repeat or shuffle; both are
/// flags for whoever decides traversal order.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    tracks: Vec<Track>,
    cursor: Option<usize>,
    repeat_mode: RepeatMode,
    shuffled: bool,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue and dispatch `start_index` (clamped to the last track).
    pub fn set_tracks(&mut self, tracks: Vec<Track>, start_index: usize) -> Option<Track> {
        self.tracks = tracks;
        self.cursor = if self.tracks.is_empty() {
            None
        } else {
            Some(start_index.min(self.tracks.len() - 1))
        };
        self.current_track().cloned()
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        let removed = self.tracks.remove(index);

        // Removing at or before the cursor steps it back, so the track that
        // slid into `index` is the next one to play.
        if let Some(current) = self.cursor {
            if index <= current {
                self.cursor = current.checked_sub(1);
            }
        }
        Some(removed)
    }

    pub fn move_track(&mut self, from: usize, to: usize) {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return;
        }

        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if let Some(current) = self.cursor {
            if from == current {
                self.cursor = Some(to);
            } else if from < current && to >= current {
                self.cursor = Some(current - 1);
            } else if from > current && to <= current {
                self.cursor = Some(current + 1);
            }
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.cursor.and_then(|i| self.tracks.get(i))
    }

    /// Move the cursor forward one step. `None` (and no change) at the end.
    pub fn advance(&mut self) -> Option<Track> {
        let next = self.cursor.map_or(0, |i| i + 1);
        self.select(next)
    }

    /// Move the cursor back one step. `None` (and no change) at the start.
    pub fn retreat(&mut self) -> Option<Track> {
        let previous = self.cursor?.checked_sub(1)?;
        self.select(previous)
    }

    /// Point the cursor at `index` if it exists.
    pub fn select(&mut self, index: usize) -> Option<Track> {
        let track = self.tracks.get(index)?.clone();
        self.cursor = Some(index);
        Some(track)
    }

    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.repeat_mode = self.repeat_mode.next();
        self.repeat_mode
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffled = !self.shuffled;
        self.shuffled
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    /// Cursor in the `-1 <= index < len` convention.
    pub fn queue_index(&self) -> i64 {
        self.cursor.map_or(-1, |i| i as i64)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = None;
    }
}
