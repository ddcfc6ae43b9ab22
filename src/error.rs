use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Token expired")]
    TokenExpired,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl AppError {
    fn kind(&self) -> &str {
        match self {
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Timeout => "timeout",
            AppError::Network(_) => "network",
            AppError::AuthRequired => "auth_required",
            AppError::TokenExpired => "token_expired",
            AppError::MalformedToken(_) => "malformed_token",
            AppError::Api { .. } => "api",
            AppError::InvalidResponse(_) => "invalid_response",
            AppError::StreamUnavailable(_) => "stream_unavailable",
            AppError::Config(_) => "config",
            AppError::NotFound(_) => "not_found",
            AppError::Io(_) => "io",
        }
    }

    /// Failures worth another attempt: the request never produced an HTTP answer.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Timeout | AppError::Network(_) => true,
            AppError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Message shown to the listener when playback cannot start.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Timeout => "Request timeout - please check your connection".to_string(),
            AppError::Http(e) if e.is_timeout() => {
                "Request timeout - please check your connection".to_string()
            }
            AppError::Api { status, .. } if *status >= 500 => {
                "Server error - please try again later".to_string()
            }
            _ => "Unable to play this track".to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
