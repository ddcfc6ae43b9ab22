pub mod api;
pub mod config;
pub mod error;
pub mod player;

use api::client::ApiClient;
use api::credentials::{CredentialStore, FileTokenStorage, TokenStorage};
use api::transport::{HttpTransport, ReqwestTransport};
use config::AppConfig;
use error::AppResult;
use player::media_session::{LoggingMediaSession, MediaSession};
use player::session::PlaybackSession;
use std::sync::Arc;

/// Shared handles the presentation layer calls into.
pub struct AppState {
    pub config: AppConfig,
    pub api_client: Arc<ApiClient>,
    pub playback: Arc<PlaybackSession>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn HttpTransport>,
        storage: Box<dyn TokenStorage>,
        media: Arc<dyn MediaSession>,
    ) -> AppResult<Self> {
        let credentials = Arc::new(CredentialStore::new(storage));
        let api_client = Arc::new(
            ApiClient::new(&config.api_base_url, transport, credentials)?
                .with_retry_policy(config.http_retry_policy())
                .with_default_options(config.request_options()),
        );

        let playback = PlaybackSession::new(api_client.clone(), media)
            .with_retry_policy(config.playback_retry_policy());
        playback.set_volume(config.volume);
        if config.muted {
            playback.mute();
        }

        log::info!(
            "Streamify core ready (backend {}, authenticated: {})",
            config.api_base_url,
            api_client.is_authenticated()
        );

        Ok(Self {
            config,
            api_client,
            playback: Arc::new(playback),
        })
    }

    /// Production wiring: config and credentials under `~/.streamify`, reqwest transport.
    pub fn from_config_dir() -> AppResult<Self> {
        let config = AppConfig::load_or_default();
        let storage = FileTokenStorage::new(AppConfig::credentials_path()?);
        Self::new(
            config,
            Arc::new(ReqwestTransport::new()?),
            Box::new(storage),
            Arc::new(LoggingMediaSession),
        )
    }

    /// Write the current volume and mute preference back to disk.
    pub fn save_player_prefs(&mut self) -> AppResult<()> {
        let muted = self.playback.is_muted();
        self.config.muted = muted;
        if !muted {
            self.config.volume = self.playback.volume();
        }
        self.config.save()
    }
}

/// Initialize `env_logger`. `RUST_LOG` overrides the default `streamify=info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("streamify=info"),
    )
    .try_init();
}
