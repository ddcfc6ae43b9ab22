use crate::api::client::ApiClient;
use crate::api::envelope::{ApiEnvelope, FailureKind};
use crate::api::models::StreamPayload;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;

/// A playable URL plus the duration in seconds when the backend reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub url: String,
    pub duration: Option<f64>,
}

impl ResolvedStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Anything that can turn a content id into a playable stream.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve_stream_url(&self, video_id: &str) -> AppResult<ResolvedStream>;
}

pub fn stream_path(video_id: &str) -> String {
    format!("/api/music/{}/stream", urlencoding::encode(video_id))
}

impl ApiClient {
    pub async fn get_stream(&self, video_id: &str) -> ApiEnvelope<StreamPayload> {
        self.get(&stream_path(video_id)).await
    }
}

#[async_trait]
impl StreamResolver for ApiClient {
    async fn resolve_stream_url(&self, video_id: &str) -> AppResult<ResolvedStream> {
        let envelope = self.get_stream(video_id).await;
        resolved_stream_from(envelope)
    }
}

/// Map a stream envelope to a stream or a typed error the player can classify.
pub(crate) fn resolved_stream_from(
    envelope: ApiEnvelope<StreamPayload>,
) -> AppResult<ResolvedStream> {
    match envelope.failure {
        Some(FailureKind::Timeout) => return Err(AppError::Timeout),
        Some(FailureKind::Network) => return Err(AppError::Network(envelope.message)),
        Some(FailureKind::Http) => {
            return Err(AppError::Api {
                status: envelope.status_code.unwrap_or(500),
                message: envelope.message,
            })
        }
        Some(FailureKind::InvalidResponse) => {
            return Err(AppError::InvalidResponse(envelope.message))
        }
        Some(FailureKind::Request) => return Err(AppError::Config(envelope.message)),
        None => {}
    }

    if !envelope.success {
        let message = if envelope.message.is_empty() {
            "No playable stream".to_string()
        } else {
            envelope.message
        };
        return Err(AppError::StreamUnavailable(message));
    }

    let payload = envelope
        .data
        .ok_or_else(|| AppError::StreamUnavailable("No stream URL in response".into()))?;
    let url = payload
        .url()
        .ok_or_else(|| AppError::StreamUnavailable("No stream URL in response".into()))?;

    Ok(ResolvedStream {
        url: url.to_string(),
        duration: payload.duration().filter(|d| d.is_finite() && *d > 0.0),
    })
}
