use crate::api::credentials::CredentialStore;
use crate::api::envelope::{ApiEnvelope, FailureKind};
use crate::api::retry::RetryPolicy;
use crate::api::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{AppError, AppResult};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Per-call knobs for `ApiClient::request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub retries: u32,
    /// Only for credential-issuing endpoints. Disables the bearer header and 401 refresh.
    pub skip_auth: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 2,
            skip_auth: false,
        }
    }
}

impl RequestOptions {
    pub fn unauthenticated() -> Self {
        Self {
            skip_auth: true,
            ..Self::default()
        }
    }
}

/// Transport error that ended a request, with how many tries it took.
struct SendFailure {
    error: AppError,
    attempts: u32,
}

pub struct ApiClient {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    retry_policy: RetryPolicy,
    default_options: RequestOptions,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
    ) -> AppResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| AppError::Config(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            transport,
            credentials,
            retry_policy: RetryPolicy::http(),
            default_options: RequestOptions::default(),
        })
    }

    /// Backoff shape between transport retries. The retry count still comes from `RequestOptions`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_default_options(mut self, options: RequestOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn default_options(&self) -> RequestOptions {
        self.default_options
    }

    fn endpoint_url(&self, endpoint: &str) -> AppResult<String> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| AppError::Config(format!("Invalid endpoint {}: {}", endpoint, e)))
    }

    /// Perform one logical call against the backend.
    ///
    /// Never fails: transport errors, HTTP errors and unreadable bodies all come
    /// back as an envelope with `success == false`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        options: Option<RequestOptions>,
    ) -> ApiEnvelope<T> {
        let options = options.unwrap_or(self.default_options);
        let url = match self.endpoint_url(endpoint) {
            Ok(url) => url,
            Err(e) => return ApiEnvelope::failure(FailureKind::Request, e.to_string(), 500),
        };
        let body = if method == Method::GET { None } else { body };

        let sent_token = if options.skip_auth {
            None
        } else {
            self.credentials.access_token()
        };

        let result = self
            .send_with_retry(&method, &url, body, sent_token.as_deref(), &options)
            .await;

        let result = match result {
            Ok(response) if response.status == 401 && !options.skip_auth => {
                self.replay_after_refresh(&method, &url, body, &options, response, sent_token)
                    .await
            }
            other => other,
        };

        finish(&method, endpoint, result)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiEnvelope<T> {
        self.request(endpoint, Method::GET, None, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> ApiEnvelope<T> {
        self.request(endpoint, Method::POST, Some(body), None).await
    }

    pub async fn put<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> ApiEnvelope<T> {
        self.request(endpoint, Method::PUT, Some(body), None).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiEnvelope<T> {
        self.request(endpoint, Method::DELETE, None, None).await
    }

    /// Unauthenticated call with retry but without the 401 refresh path.
    /// The refresh exchange itself goes through here.
    pub(crate) async fn request_without_refresh<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> ApiEnvelope<T> {
        let options = RequestOptions {
            skip_auth: true,
            ..self.default_options
        };
        let url = match self.endpoint_url(endpoint) {
            Ok(url) => url,
            Err(e) => return ApiEnvelope::failure(FailureKind::Request, e.to_string(), 500),
        };
        let result = self
            .send_with_retry(&method, &url, body, None, &options)
            .await;
        finish(&method, endpoint, result)
    }

    async fn replay_after_refresh(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        unauthorized: HttpResponse,
        sent_token: Option<String>,
    ) -> Result<HttpResponse, SendFailure> {
        log::info!("{} {} returned 401, refreshing credentials", method, url);

        let refreshed = self
            .credentials
            .refresh_with(sent_token.as_deref(), |refresh_token| {
                self.exchange_refresh_token(refresh_token)
            })
            .await;
        if let Err(e) = refreshed {
            log::warn!("Token refresh failed: {}", e);
            return Ok(unauthorized);
        }

        // One replay, no retries, no second refresh.
        let token = self.credentials.access_token();
        let replay = RequestOptions {
            retries: 0,
            ..*options
        };
        self.send_with_retry(method, url, body, token.as_deref(), &replay)
            .await
    }

    fn build_request(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> HttpRequest {
        let mut headers = vec![(ACCEPT.to_string(), JSON_CONTENT_TYPE.to_string())];
        if body.is_some() {
            headers.push((CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string()));
        }
        if let Some(token) = token {
            headers.push((AUTHORIZATION.to_string(), format!("Bearer {}", token)));
        }

        HttpRequest {
            method: method.clone(),
            url: url.to_string(),
            headers,
            body: body.cloned(),
        }
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
        options: &RequestOptions,
    ) -> Result<HttpResponse, SendFailure> {
        let policy = self.retry_policy.with_max_retries(options.retries);
        let mut attempts = 0;

        loop {
            let request = self.build_request(method, url, body, token);
            log::debug!("{} {}", method, url);

            let error =
                match tokio::time::timeout(options.timeout, self.transport.send(request)).await {
                    Ok(Ok(response)) => return Ok(response),
                    Ok(Err(e)) => e,
                    Err(_) => AppError::Timeout,
                };

            attempts += 1;
            if !error.is_transient() || attempts >= policy.max_attempts() {
                return Err(SendFailure { error, attempts });
            }

            let delay = policy.delay_for(attempts - 1);
            log::warn!(
                "{} {} failed (attempt {}/{}): {}. Retrying in {}ms",
                method,
                url,
                attempts,
                policy.max_attempts(),
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn finish<T: DeserializeOwned>(
    method: &Method,
    endpoint: &str,
    result: Result<HttpResponse, SendFailure>,
) -> ApiEnvelope<T> {
    let envelope = match result {
        Ok(response) => parse_response(response),
        Err(SendFailure { error, attempts }) => {
            let kind = if matches!(error, AppError::Timeout)
                || matches!(&error, AppError::Http(e) if e.is_timeout())
            {
                FailureKind::Timeout
            } else if error.is_transient() {
                FailureKind::Network
            } else {
                FailureKind::Request
            };
            let message = if attempts > 1 {
                format!("Request failed after {} attempts: {}", attempts, error)
            } else {
                error.to_string()
            };
            ApiEnvelope::failure(kind, message, 500)
        }
    };

    if !envelope.success {
        log::warn!(
            "{} {} failed ({}): {}",
            method,
            endpoint,
            envelope.status_code.unwrap_or_default(),
            envelope.message
        );
    }
    envelope
}

fn status_message(status: u16) -> String {
    match status {
        400 => "Bad request".to_string(),
        401 => "Unauthorized".to_string(),
        403 => "Forbidden".to_string(),
        404 => "Not found".to_string(),
        408 => "Request timeout".to_string(),
        429 => "Too many requests".to_string(),
        500..=599 => "Server error - please try again later".to_string(),
        _ => format!("Request failed with status {}", status),
    }
}

/// Turn a raw HTTP answer into an envelope.
///
/// Non-2xx answers become `FailureKind::Http` with the body's `message` when
/// there is one. A 2xx object without `success`/`data` keys is taken as the
/// payload itself.
fn parse_response<T: DeserializeOwned>(response: HttpResponse) -> ApiEnvelope<T> {
    let status = response.status;
    let success = response.is_success();

    let object = match serde_json::from_str::<Value>(&response.body) {
        Ok(Value::Object(object)) => object,
        Ok(_) | Err(_) if !success => {
            return ApiEnvelope::failure(FailureKind::Http, status_message(status), status)
        }
        Ok(_) => {
            return ApiEnvelope::failure(
                FailureKind::InvalidResponse,
                "Invalid response from server: expected a JSON object",
                status,
            )
        }
        Err(e) => {
            return ApiEnvelope::failure(
                FailureKind::InvalidResponse,
                format!("Invalid response from server: {}", e),
                status,
            )
        }
    };

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(String::from);

    if !success {
        return ApiEnvelope::failure(
            FailureKind::Http,
            message.unwrap_or_else(|| status_message(status)),
            status,
        );
    }

    let is_envelope = object.contains_key("success") || object.contains_key("data");
    let status_code = object
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(status);
    let reported_success = object
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let payload = if is_envelope {
        object.get("data").cloned().unwrap_or(Value::Null)
    } else {
        Value::Object(object)
    };

    let data = if payload.is_null() {
        None
    } else {
        match serde_json::from_value::<T>(payload) {
            Ok(data) => Some(data),
            Err(e) => {
                return ApiEnvelope::failure(
                    FailureKind::InvalidResponse,
                    format!("Invalid response from server: {}", e),
                    status,
                )
            }
        }
    };

    ApiEnvelope {
        success: reported_success,
        message: message.unwrap_or_default(),
        data,
        status_code: Some(status_code),
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Stream {
        url: String,
    }

    fn client(base: &str) -> ApiClient {
        struct Unused;
        #[async_trait::async_trait]
        impl HttpTransport for Unused {
            async fn send(&self, _request: HttpRequest) -> AppResult<HttpResponse> {
                Err(AppError::Network("unused".into()))
            }
        }
        ApiClient::new(base, Arc::new(Unused), Arc::new(CredentialStore::in_memory())).unwrap()
    }

    #[test]
    fn endpoints_join_onto_base_path() {
        let c = client("http://localhost:5000");
        assert_eq!(
            c.endpoint_url("/api/auth/login").unwrap(),
            "http://localhost:5000/api/auth/login"
        );

        let c = client("https://example.test/backend");
        assert_eq!(
            c.endpoint_url("/api/music/abc/stream").unwrap(),
            "https://example.test/backend/api/music/abc/stream"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let err = ApiClient::new(
            "not a url",
            Arc::new(crate::api::transport::ReqwestTransport::new().unwrap()),
            Arc::new(CredentialStore::in_memory()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn parses_success_envelope() {
        let envelope: ApiEnvelope<Stream> = parse_response(HttpResponse::new(
            200,
            r#"{"success":true,"message":"ok","data":{"url":"https://cdn/a"}}"#,
        ));
        assert!(envelope.success);
        assert_eq!(envelope.status_code, Some(200));
        assert_eq!(envelope.data.unwrap().url, "https://cdn/a");
    }

    #[test]
    fn backend_reported_failure_keeps_its_message() {
        let envelope: ApiEnvelope<Stream> = parse_response(HttpResponse::new(
            200,
            r#"{"success":false,"message":"not found"}"#,
        ));
        assert!(!envelope.success);
        assert_eq!(envelope.message, "not found");
        assert_eq!(envelope.failure, None);
    }

    #[test]
    fn bare_object_is_the_payload() {
        let envelope: ApiEnvelope<Stream> =
            parse_response(HttpResponse::new(200, r#"{"url":"https://cdn/b"}"#));
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap().url, "https://cdn/b");
    }

    #[test]
    fn http_error_uses_body_message_when_present() {
        let envelope: ApiEnvelope<Stream> = parse_response(HttpResponse::new(
            403,
            r#"{"success":false,"message":"Premium required"}"#,
        ));
        assert!(!envelope.success);
        assert_eq!(envelope.message, "Premium required");
        assert_eq!(envelope.status_code, Some(403));
        assert_eq!(envelope.failure, Some(FailureKind::Http));

        let envelope: ApiEnvelope<Stream> =
            parse_response(HttpResponse::new(502, "<html>bad gateway</html>"));
        assert_eq!(envelope.message, "Server error - please try again later");
        assert_eq!(envelope.status_code, Some(502));
    }

    #[test]
    fn malformed_bodies_are_invalid_responses() {
        let envelope: ApiEnvelope<Stream> = parse_response(HttpResponse::new(200, "not json"));
        assert_eq!(envelope.failure, Some(FailureKind::InvalidResponse));
        assert!(envelope.message.starts_with("Invalid response from server"));

        let envelope: ApiEnvelope<Stream> = parse_response(HttpResponse::new(200, "[1,2]"));
        assert_eq!(envelope.failure, Some(FailureKind::InvalidResponse));

        let envelope: ApiEnvelope<Stream> =
            parse_response(HttpResponse::new(200, r#"{"success":true,"data":{"uri":1}}"#));
        assert_eq!(envelope.failure, Some(FailureKind::InvalidResponse));
    }
}
