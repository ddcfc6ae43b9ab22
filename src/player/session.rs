use crate::api::models::Track;
use crate::api::music::{ResolvedStream, StreamResolver};
use crate::api::retry::RetryPolicy;
use crate::error::{AppError, AppResult};
use crate::player::media_session::{
    MediaCommand, MediaMetadata, MediaPlaybackState, MediaSession,
};
use crate::player::queue::{PlaybackQueue, RepeatMode};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "message")]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
    Errored(String),
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TransportState::Errored(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started,
    Failed(String),
    /// A later `play` or `stop` took over before this one finished.
    Superseded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub state: TransportState,
    pub is_playing: bool,
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
    pub muted: bool,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    pub queue: Vec<Track>,
    pub queue_index: i64,
}

struct SessionState {
    transport: TransportState,
    current_track: Option<Track>,
    position: f64,
    duration: f64,
    volume: f32,
    /// Volume to restore on unmute. `Some` exactly while muted.
    pre_mute_volume: Option<f32>,
    queue: PlaybackQueue,
    /// Bumped by every `play` and `stop`; results carrying an older value are dropped.
    generation: u64,
}

/// Owns transport state and the queue, and resolves stream URLs for `play`.
pub struct PlaybackSession {
    resolver: Arc<dyn StreamResolver>,
    media: Arc<dyn MediaSession>,
    retry_policy: RetryPolicy,
    state: Mutex<SessionState>,
}

impl PlaybackSession {
    pub fn new(resolver: Arc<dyn StreamResolver>, media: Arc<dyn MediaSession>) -> Self {
        Self {
            resolver,
            media,
            retry_policy: RetryPolicy::playback(),
            state: Mutex::new(SessionState {
                transport: TransportState::Idle,
                current_track: None,
                position: 0.0,
                duration: 0.0,
                volume: 1.0,
                pre_mute_volume: None,
                queue: PlaybackQueue::new(),
                generation: 0,
            }),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Start playback of `track`, pre-empting whatever was active.
    ///
    /// Resolution is retried with linear backoff on transient failures and on
    /// "no playable stream" answers. HTTP errors end the attempt immediately.
    ///
    /// Media-session pushes happen under the state lock so they follow the
    /// same order as the transitions they mirror.
    pub async fn play(&self, track: Track) -> PlayOutcome {
        log::info!(
            "[play] id={} title={} artist={}",
            track.video_id,
            track.title,
            track.artist
        );
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.transport = TransportState::Loading;
            state.current_track = Some(Track {
                url: None,
                ..track.clone()
            });
            state.position = 0.0;
            state.duration = track.duration.unwrap_or(0.0);
            self.media.set_metadata(&MediaMetadata::from(&track));
            self.media.set_playback_state(MediaPlaybackState::Paused);
            state.generation
        };

        let result = self.resolve_with_retry(&track.video_id, generation).await;

        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("[play] {} superseded, discarding result", track.video_id);
            return PlayOutcome::Superseded;
        }

        match result {
            Ok(stream) => {
                let mut track = track;
                track.url = Some(stream.url);
                if let Some(duration) = stream.duration {
                    track.duration = Some(duration);
                }
                log::info!("[play] {} playing", track.video_id);
                state.duration = track.duration.unwrap_or(0.0);
                state.position = 0.0;
                state.transport = TransportState::Playing;
                if stream.duration.is_some() {
                    self.media.set_metadata(&MediaMetadata::from(&track));
                }
                self.media.set_playback_state(MediaPlaybackState::Playing);
                state.current_track = Some(track);
                PlayOutcome::Started
            }
            Err(e) => {
                log::error!("[play] {} failed: {}", track.video_id, e);
                let message = e.user_message();
                state.transport = TransportState::Errored(message.clone());
                PlayOutcome::Failed(message)
            }
        }
    }

    async fn resolve_with_retry(
        &self,
        video_id: &str,
        generation: u64,
    ) -> AppResult<ResolvedStream> {
        let max_attempts = self.retry_policy.max_attempts();
        let mut attempts = 0;

        loop {
            let error = match self.resolver.resolve_stream_url(video_id).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };

            attempts += 1;
            if !is_retryable(&error) || attempts >= max_attempts || !self.is_current(generation) {
                return Err(error);
            }

            let delay = self.retry_policy.delay_for(attempts - 1);
            log::warn!(
                "[play] Stream for {} failed (attempt {}/{}): {}. Retrying in {}ms",
                video_id,
                attempts,
                max_attempts,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn pause(&self) {
        let mut state = self.lock();
        if state.transport == TransportState::Playing {
            state.transport = TransportState::Paused;
            self.media.set_playback_state(MediaPlaybackState::Paused);
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock();
        if state.transport == TransportState::Paused {
            state.transport = TransportState::Playing;
            self.media.set_playback_state(MediaPlaybackState::Playing);
        }
    }

    pub fn toggle_play_pause(&self) {
        let mut state = self.lock();
        match state.transport {
            TransportState::Playing => {
                state.transport = TransportState::Paused;
                self.media.set_playback_state(MediaPlaybackState::Paused);
            }
            TransportState::Paused => {
                state.transport = TransportState::Playing;
                self.media.set_playback_state(MediaPlaybackState::Playing);
            }
            _ => {}
        }
    }

    pub fn stop(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.transport = TransportState::Idle;
        state.current_track = None;
        state.position = 0.0;
        state.duration = 0.0;
        self.media.clear();
        log::info!("[stop] Playback stopped");
    }

    /// Move the playhead. Out-of-range values are stored as given.
    pub fn seek(&self, time: f64) {
        self.lock().position = time;
    }

    pub fn set_volume(&self, volume: f32) {
        let mut state = self.lock();
        state.volume = volume.clamp(0.0, 1.0);
        if state.volume > 0.0 {
            state.pre_mute_volume = None;
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn is_muted(&self) -> bool {
        self.lock().pre_mute_volume.is_some()
    }

    /// No-op while already muted, so the stored volume is never overwritten with 0.
    pub fn mute(&self) {
        mute_state(&mut self.lock());
    }

    pub fn unmute(&self) {
        unmute_state(&mut self.lock());
    }

    /// Returns whether the session is muted afterwards.
    pub fn toggle_mute(&self) -> bool {
        let mut state = self.lock();
        if state.pre_mute_volume.is_some() {
            unmute_state(&mut state);
            false
        } else {
            mute_state(&mut state);
            true
        }
    }

    pub fn add_to_queue(&self, track: Track) {
        self.lock().queue.add_track(track);
    }

    pub fn remove_from_queue(&self, index: usize) -> Option<Track> {
        self.lock().queue.remove_track(index)
    }

    pub fn move_in_queue(&self, from: usize, to: usize) {
        self.lock().queue.move_track(from, to);
    }

    pub fn clear_queue(&self) {
        self.lock().queue.clear();
    }

    /// Replace the queue and play from `start_index`.
    pub async fn set_queue(&self, tracks: Vec<Track>, start_index: usize) -> Option<PlayOutcome> {
        let track = self.lock().queue.set_tracks(tracks, start_index);
        match track {
            Some(track) => Some(self.play(track).await),
            None => None,
        }
    }

    /// `None` when the cursor is already on the last track.
    pub async fn play_next(&self) -> Option<PlayOutcome> {
        let next = self.lock().queue.advance();
        match next {
            Some(track) => Some(self.play(track).await),
            None => None,
        }
    }

    /// `None` when the cursor is on the first track or nothing was dispatched.
    pub async fn play_previous(&self) -> Option<PlayOutcome> {
        let previous = self.lock().queue.retreat();
        match previous {
            Some(track) => Some(self.play(track).await),
            None => None,
        }
    }

    pub async fn play_queue_index(&self, index: usize) -> AppResult<PlayOutcome> {
        let track = self.lock().queue.select(index);
        match track {
            Some(track) => Ok(self.play(track).await),
            None => Err(AppError::NotFound(format!(
                "Queue index {} out of bounds",
                index
            ))),
        }
    }

    pub fn toggle_repeat(&self) -> RepeatMode {
        self.lock().queue.toggle_repeat()
    }

    pub fn toggle_shuffle(&self) -> bool {
        self.lock().queue.toggle_shuffle()
    }

    pub fn transport(&self) -> TransportState {
        self.lock().transport.clone()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.lock().current_track.clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.lock();
        PlaybackSnapshot {
            current_track: state.current_track.clone(),
            state: state.transport.clone(),
            is_playing: state.transport.is_playing(),
            position: state.position,
            duration: state.duration,
            volume: state.volume,
            muted: state.pre_mute_volume.is_some(),
            repeat_mode: state.queue.repeat_mode(),
            shuffle: state.queue.is_shuffled(),
            queue: state.queue.tracks().to_vec(),
            queue_index: state.queue.queue_index(),
        }
    }

    /// Route a hardware key or OS transport control as if the user had clicked.
    pub async fn handle_media_command(&self, command: MediaCommand) {
        log::debug!("Media command: {:?}", command);
        match command {
            MediaCommand::Play => self.resume(),
            MediaCommand::Pause => self.pause(),
            MediaCommand::TogglePlayPause => self.toggle_play_pause(),
            MediaCommand::NextTrack => {
                self.play_next().await;
            }
            MediaCommand::PreviousTrack => {
                self.play_previous().await;
            }
            MediaCommand::SeekTo(time) => self.seek(time),
        }
    }
}

/// Drain media commands into `session` until every sender is dropped.
pub fn spawn_media_command_listener(
    session: Arc<PlaybackSession>,
    mut commands: mpsc::UnboundedReceiver<MediaCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            session.handle_media_command(command).await;
        }
        log::debug!("Media command channel closed");
    })
}

fn mute_state(state: &mut SessionState) {
    if state.pre_mute_volume.is_none() {
        state.pre_mute_volume = Some(state.volume);
        state.volume = 0.0;
    }
}

fn unmute_state(state: &mut SessionState) {
    if let Some(volume) = state.pre_mute_volume.take() {
        state.volume = volume;
    }
}

fn is_retryable(error: &AppError) -> bool {
    error.is_transient() || matches!(error, AppError::StreamUnavailable(_))
}
