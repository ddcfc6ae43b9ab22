#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamify_lib::api::client::ApiClient;
use streamify_lib::api::credentials::{CredentialStore, MemoryTokenStorage, TokenPair};
use streamify_lib::api::transport::{HttpRequest, HttpResponse, HttpTransport};
use streamify_lib::error::{AppError, AppResult};
use tokio::time::Instant;

pub const BASE_URL: &str = "http://backend.test";

#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, &'static str),
    NetworkError,
    /// Never answers; only a timeout ends the attempt.
    Hang,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Reply::Json(
            200,
            serde_json::json!({"success": true, "message": "ok", "data": data}),
        )
    }

    pub fn fail(status: u16, message: &str) -> Self {
        Reply::Json(
            status,
            serde_json::json!({"success": false, "message": message}),
        )
    }

    pub fn after(ms: u64, reply: Reply) -> Self {
        Reply::Delayed(Duration::from_millis(ms), Box::new(reply))
    }
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: HttpRequest,
    pub path: String,
    pub at: Instant,
}

/// Answers from per-route scripts. Replies are used in order and the last one repeats.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    recorded: Mutex<Vec<Recorded>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, path: &str, replies: Vec<Reply>) -> &Self {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn calls(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.recorded()
            .into_iter()
            .filter(|r| r.request.method == method && r.path == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls(method, path).len()
    }

    fn next_reply(&self, method: &Method, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes
            .iter_mut()
            .find(|r| &r.method == method && r.path == path)
        else {
            return Reply::fail(404, "no route");
        };
        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap()
        } else {
            route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Reply::fail(404, "no reply"))
        }
    }
}

async fn play(reply: Reply) -> AppResult<HttpResponse> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Json(status, body) => return Ok(HttpResponse::new(status, body.to_string())),
            Reply::Raw(status, body) => return Ok(HttpResponse::new(status, body)),
            Reply::NetworkError => return Err(AppError::Network("connection refused".into())),
            Reply::Hang => return std::future::pending().await,
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let reply = self.next_reply(&request.method, &path);
        self.recorded.lock().unwrap().push(Recorded {
            request,
            path,
            at: Instant::now(),
        });
        play(reply).await
    }
}

pub fn jwt_expiring_in(seconds: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + seconds;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp));
    format!("{}.{}.sig", header, payload)
}

pub fn client_with(transport: Arc<MockTransport>, tokens: Option<TokenPair>) -> ApiClient {
    let storage = match tokens {
        Some(tokens) => MemoryTokenStorage::with_tokens(tokens),
        None => MemoryTokenStorage::new(),
    };
    let credentials = Arc::new(CredentialStore::new(Box::new(storage)));
    ApiClient::new(BASE_URL, transport, credentials).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
