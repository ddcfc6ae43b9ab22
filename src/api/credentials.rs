//! Access/refresh token pair shared by every outbound request.

use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Durable home of the token pair.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Option<TokenPair>;
    fn store(&self, tokens: &TokenPair) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
}

/// Stores the pair as `{"accessToken": ..., "refreshToken": ...}` in a JSON file.
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Option<TokenPair> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable credentials at {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn store(&self, tokens: &TokenPair) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStorage {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Option<TokenPair> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, tokens: &TokenPair) -> AppResult<()> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// In-memory view of the token pair backed by a `TokenStorage`.
///
/// Refreshes are single-flight: callers that observed the same stale access
/// token queue on one lock, and everyone after the first finds the token
/// already replaced and returns without a second exchange.
pub struct CredentialStore {
    storage: Box<dyn TokenStorage>,
    cached: RwLock<Option<TokenPair>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Box<dyn TokenStorage>) -> Self {
        let cached = storage.load();
        Self {
            storage,
            cached: RwLock::new(cached),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryTokenStorage::new()))
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|t| t.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get().map(|t| t.refresh_token)
    }

    /// Replace the pair. The in-memory copy is updated even if persisting fails.
    pub fn set(&self, tokens: TokenPair) -> AppResult<()> {
        let result = self.storage.store(&tokens);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
        result
    }

    pub fn clear(&self) {
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.storage.clear() {
            log::error!("Failed to clear stored credentials: {}", e);
        }
    }

    /// Local expiry check on the access token. Never touches the network.
    ///
    /// Expired or malformed tokens are dropped from storage on the spot.
    pub fn is_authenticated(&self) -> bool {
        let Some(tokens) = self.get() else {
            return false;
        };

        match token_expiry(&tokens.access_token) {
            Ok(Some(exp)) if exp <= Utc::now() => {
                log::info!("Access token expired at {}, logging out", exp);
                self.clear();
                false
            }
            Ok(_) => true,
            Err(e) => {
                log::warn!("{}, logging out", e);
                self.clear();
                false
            }
        }
    }

    /// Run `exchange` with the current refresh token unless another caller
    /// already replaced `stale_access`.
    pub async fn refresh_with<F, Fut>(
        &self,
        stale_access: Option<&str>,
        exchange: F,
    ) -> AppResult<()>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = AppResult<TokenPair>>,
    {
        let _guard = self.refresh_lock.lock().await;

        let current = self.get().ok_or(AppError::AuthRequired)?;
        if stale_access != Some(current.access_token.as_str()) {
            log::debug!("Credentials changed while waiting, skipping refresh");
            return Ok(());
        }

        let tokens = exchange(current.refresh_token).await?;
        if let Err(e) = self.set(tokens) {
            log::error!("Failed to persist refreshed credentials: {}", e);
        }
        Ok(())
    }
}

/// Expiry of a JWT read from its `exp` claim, or `None` when the claim is absent.
pub fn token_expiry(token: &str) -> AppResult<Option<DateTime<Utc>>> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AppError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| AppError::MalformedToken(format!("payload is not base64: {}", e)))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::MalformedToken(format!("payload is not JSON: {}", e)))?;
    if !claims.is_object() {
        return Err(AppError::MalformedToken("payload is not an object".into()));
    }

    let Some(exp) = claims.get("exp") else {
        return Ok(None);
    };
    let seconds = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))
        .ok_or_else(|| AppError::MalformedToken("exp claim is not a number".into()))?;

    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(Some)
        .ok_or_else(|| AppError::MalformedToken(format!("exp {} out of range", seconds)))
}
