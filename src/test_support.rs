//! Fakes shared by the unit tests

use crate::clock::Clock;
use crate::error::{StorageError, TransportError};
use crate::http_client::{HttpRequest, HttpResponse, Transport};
use crate::navigation::Navigator;
use crate::storage::KeyValueStore;
use crate::types::{Role, UserProfile};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

/// Fixed "now" for deterministic tests, a whole number of seconds
pub const NOW_MS: i64 = 1_760_000_000_000;

pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Follows tokio's clock, so paused-time tests move it with `sleep`
pub struct TokioClock {
    base_ms: i64,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            base_ms,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.base_ms + self.start.elapsed().as_millis() as i64
    }
}

/// Unsigned JWT-shaped token carrying `claims`
pub fn make_token(claims: JsonValue) -> String {
    let header = json!({"alg": "HS256", "typ": "JWT"});
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(b"sig"),
    )
}

pub fn standard_claims(user_id: &str, role: &str, iat: i64, exp: i64) -> JsonValue {
    json!({
        "userId": user_id,
        "email": format!("{user_id}@lingua.test"),
        "role": role,
        "subscriptionTier": "FREE",
        "iat": iat,
        "exp": exp,
    })
}

pub fn sample_user(id: &str, role: Role) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: format!("{id}@lingua.test"),
        role,
        status: Some("ACTIVE".to_string()),
        subscription_tier: Some("FREE".to_string()),
        first_name: Some("Camille".to_string()),
        last_name: None,
        created_at: None,
        updated_at: None,
    }
}

/// Successful login/refresh body in the backend envelope
pub fn auth_body(access_token: &str, refresh_token: &str, role: Role) -> JsonValue {
    json!({
        "success": true,
        "data": {
            "user": sample_user("u1", role),
            "tokens": {
                "accessToken": access_token,
                "refreshToken": refresh_token,
            },
        },
    })
}

/// Storage whose every operation fails
pub struct FailingStorage;

impl KeyValueStore for FailingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

pub struct RecordingNavigator {
    path: Mutex<String>,
    redirects: Mutex<Vec<String>>,
    cookie_clears: AtomicUsize,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        Self {
            path: Mutex::new(path.to_string()),
            redirects: Mutex::new(Vec::new()),
            cookie_clears: AtomicUsize::new(0),
        }
    }

    pub fn set_path(&self, path: &str) {
        *self.path.lock() = path.to_string();
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }

    pub fn cookie_clears(&self) -> usize {
        self.cookie_clears.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.lock().clone()
    }

    fn redirect(&self, path: &str) {
        self.redirects.lock().push(path.to_string());
        *self.path.lock() = path.to_string();
    }

    fn clear_auth_cookies(&self) {
        self.cookie_clears.fetch_add(1, Ordering::SeqCst);
    }
}

type Responder =
    Box<dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Scripted transport
///
/// The responder receives each request and its 1-based count for that path.
pub struct FakeTransport {
    responder: Responder,
    delays: HashMap<String, Duration>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delays: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests to `path` only after `delay`
    #[must_use]
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.sent.lock().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for FakeTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let nth = {
            let mut sent = self.sent.lock();
            sent.push(request.clone());
            sent.iter().filter(|r| r.path == request.path).count()
        };
        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }
        (self.responder)(request, nth)
    }
}
