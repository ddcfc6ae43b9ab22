use crate::api::client::{ApiClient, RequestOptions};
use crate::api::credentials::TokenPair;
use crate::api::envelope::ApiEnvelope;
use crate::api::models::{AuthPayload, AuthStatus, User};
use crate::error::{AppError, AppResult};
use reqwest::Method;
use serde_json::json;

pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const ME_PATH: &str = "/api/auth/me";

impl ApiClient {
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ApiEnvelope<AuthPayload> {
        let body = json!({ "username": username, "email": email, "password": password });
        let envelope = self
            .request(
                REGISTER_PATH,
                Method::POST,
                Some(&body),
                Some(self.credential_options()),
            )
            .await;
        self.persist_tokens(&envelope);
        envelope
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiEnvelope<AuthPayload> {
        let body = json!({ "email": email, "password": password });
        let envelope = self
            .request(
                LOGIN_PATH,
                Method::POST,
                Some(&body),
                Some(self.credential_options()),
            )
            .await;
        self.persist_tokens(&envelope);
        envelope
    }

    /// Explicit refresh, e.g. at startup. Requests refresh on their own after a 401.
    pub async fn refresh_session(&self) -> AppResult<()> {
        let stale = self.credentials().access_token();
        self.credentials()
            .refresh_with(stale.as_deref(), |refresh_token| {
                self.exchange_refresh_token(refresh_token)
            })
            .await
    }

    pub async fn me(&self) -> ApiEnvelope<User> {
        let envelope: ApiEnvelope<serde_json::Value> = self.get(ME_PATH).await;
        // `/me` answers either the user itself or `{ user: {...} }`.
        let data = envelope.data.and_then(|value| {
            let user = value.get("user").cloned().unwrap_or(value);
            serde_json::from_value::<User>(user)
                .map_err(|e| log::warn!("Unreadable user profile: {}", e))
                .ok()
        });
        ApiEnvelope {
            success: envelope.success,
            message: envelope.message,
            data,
            status_code: envelope.status_code,
            failure: envelope.failure,
        }
    }

    /// Local logout: forgets both tokens.
    pub fn logout(&self) {
        log::info!("Logging out");
        self.credentials().clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_authenticated()
    }

    pub async fn auth_status(&self) -> AuthStatus {
        if !self.is_authenticated() {
            return AuthStatus {
                authenticated: false,
                user: None,
            };
        }

        let envelope = self.me().await;
        AuthStatus {
            authenticated: self.is_authenticated(),
            user: envelope.data,
        }
    }

    pub(crate) async fn exchange_refresh_token(
        &self,
        refresh_token: String,
    ) -> AppResult<TokenPair> {
        let body = json!({ "refreshToken": refresh_token });
        let envelope: ApiEnvelope<AuthPayload> = self
            .request_without_refresh(REFRESH_PATH, Method::POST, Some(&body))
            .await;

        match envelope.data {
            Some(payload) if envelope.success => {
                log::info!("Access token refreshed");
                Ok(TokenPair::new(payload.access_token, payload.refresh_token))
            }
            _ if envelope.status_code == Some(401) || envelope.status_code == Some(403) => {
                Err(AppError::TokenExpired)
            }
            _ => Err(AppError::Api {
                status: envelope.status_code.unwrap_or(500),
                message: format!("Token refresh failed: {}", envelope.message),
            }),
        }
    }

    fn credential_options(&self) -> RequestOptions {
        RequestOptions {
            skip_auth: true,
            ..self.default_options()
        }
    }

    fn persist_tokens(&self, envelope: &ApiEnvelope<AuthPayload>) {
        let Some(payload) = envelope.data.as_ref().filter(|_| envelope.success) else {
            return;
        };
        let tokens = TokenPair::new(payload.access_token.clone(), payload.refresh_token.clone());
        if let Err(e) = self.credentials().set(tokens) {
            log::error!("Failed to save credentials: {}", e);
        }
    }
}
