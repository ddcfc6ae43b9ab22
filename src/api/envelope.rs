use serde::{Deserialize, Serialize};

/// Why a failed envelope failed. Not part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    /// The request could not be built or sent at all.
    Request,
    Http,
    InvalidResponse,
}

/// Uniform result of every backend call: `{success, message, data?, statusCode?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(message: impl Into<String>, data: Option<T>, status_code: u16) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            status_code: Some(status_code),
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            status_code: Some(status_code),
            failure: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_shape() {
        let envelope: ApiEnvelope<serde_json::Value> = serde_json::from_str(
            r#"{"success":true,"message":"ok","data":{"url":"https://cdn/x"},"statusCode":200}"#,
        )
        .unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.status_code, Some(200));
        assert_eq!(envelope.data.unwrap()["url"], "https://cdn/x");
        assert_eq!(envelope.failure, None);
    }

    #[test]
    fn message_and_data_are_optional() {
        let envelope: ApiEnvelope<String> = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!envelope.success);
        assert!(envelope.message.is_empty());
        assert!(envelope.data.is_none());
    }

    #[test]
    fn failure_serializes_without_kind() {
        let envelope: ApiEnvelope<()> =
            ApiEnvelope::failure(FailureKind::Timeout, "Request timeout", 500);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"success": false, "message": "Request timeout", "statusCode": 500})
        );
        assert_eq!(envelope.failure, Some(FailureKind::Timeout));
    }
}
