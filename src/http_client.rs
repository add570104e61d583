//! API gateway with bearer auth, refresh-on-401 and uniform response envelopes

use crate::config::ClientConfig;
use crate::error::{Result, TransportError};
use crate::navigation::{is_login_page, login_path_for, Navigator};
use crate::session_store::SessionStore;
use crate::storage::KeyValueStore;
use crate::token_store::TokenKind;
use crate::types::*;
use async_singleflight::Group;
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use reqwest::Method;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const GOOGLE_LOGIN_PATH: &str = "/auth/social/google";

/// Requests to these endpoints never trigger a refresh on 401
const AUTH_ENDPOINTS: [&str; 5] = [
    LOGIN_PATH,
    REGISTER_PATH,
    REFRESH_PATH,
    LOGOUT_PATH,
    "/auth/social/",
];

const REFRESH_FLIGHT_KEY: &str = "refresh";

pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|prefix| path.starts_with(prefix))
}

/// Outbound request, relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub bearer: Option<String>,
    retried: bool,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether this is the single post-refresh retry
    pub fn is_retry(&self) -> bool {
        self.retried
    }
}

/// Raw HTTP response; non-JSON bodies arrive as a JSON string
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl HttpResponse {
    pub fn new(status: u16, body: JsonValue) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Wire-level sender
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, TransportError>> + Send;
}

/// [`Transport`] over reqwest
pub struct ReqwestTransport {
    base_url: String,
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http_client.request(request.method.clone(), &url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text))
        };

        Ok(HttpResponse { status, body })
    }
}

/// Normalize a transport outcome into the response envelope
pub fn into_envelope<T: DeserializeOwned>(
    outcome: std::result::Result<HttpResponse, TransportError>,
) -> ApiResponse<T> {
    let response = match outcome {
        Ok(response) => response,
        Err(e) => return ApiResponse::failure(ApiError::new(e.to_string(), e.code())),
    };

    if !response.is_success() {
        return ApiResponse::failure(error_from_body(response.status, &response.body));
    }

    let enveloped = response
        .body
        .as_object()
        .and_then(|obj| obj.get("success"))
        .and_then(JsonValue::as_bool);

    let (data, message) = match enveloped {
        Some(false) => return ApiResponse::failure(error_from_body(response.status, &response.body)),
        Some(true) => (
            response.body.get("data").cloned().unwrap_or(JsonValue::Null),
            response
                .body
                .get("message")
                .and_then(JsonValue::as_str)
                .map(str::to_owned),
        ),
        None => (response.body, None),
    };

    match serde_json::from_value::<T>(data) {
        Ok(data) => ApiResponse {
            success: true,
            data: Some(data),
            message,
            error: None,
        },
        Err(e) => ApiResponse::failure(ApiError::new(
            format!("Unexpected response shape: {e}"),
            "INVALID_RESPONSE",
        )),
    }
}

fn error_from_body(status: u16, body: &JsonValue) -> ApiError {
    let error = body.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(JsonValue::as_str)
        .or_else(|| error.and_then(JsonValue::as_str))
        .or_else(|| body.get("message").and_then(JsonValue::as_str))
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Request failed with status {status}"));
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP_{status}"));
    let details = error.and_then(|e| e.get("details")).cloned();

    ApiError {
        message,
        code: Some(code),
        details,
    }
}

/// API client with automatic bearer attachment and refresh-and-retry
///
/// At most one refresh is in flight at a time; concurrent 401s share it.
pub struct ApiClient<T: Transport> {
    transport: T,
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    tokens: RwLock<Option<TokenPair>>,
    /// Bumped whenever local auth state is forcibly cleared
    auth_epoch: AtomicU64,
    /// Concurrent refreshes join one in-flight exchange; waiters get the
    /// failure reason as a cloned `String`
    refresh_singleflight: Group<AuthPayload, String>,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, storage: Arc<dyn KeyValueStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            transport,
            store: SessionStore::new(storage),
            navigator,
            tokens: RwLock::new(None),
            auth_epoch: AtomicU64::new(0),
            refresh_singleflight: Group::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn auth_epoch(&self) -> u64 {
        self.auth_epoch.load(Ordering::SeqCst)
    }

    /// Cached access token, falling back to persisted storage
    pub async fn access_token(&self) -> Option<String> {
        let cached = self.tokens.read().as_ref().map(|t| t.access_token.clone());
        match cached {
            Some(token) => Some(token),
            None => self.store.tokens().get(TokenKind::Access).await,
        }
    }

    async fn refresh_token(&self) -> Option<String> {
        let cached = self.tokens.read().as_ref().map(|t| t.refresh_token.clone());
        match cached {
            Some(token) => Some(token),
            None => self.store.tokens().get(TokenKind::Refresh).await,
        }
    }

    /// Cache and persist a token pair; the cache holds even if storage fails
    pub async fn set_tokens(&self, tokens: &TokenPair) -> bool {
        *self.tokens.write() = Some(tokens.clone());
        self.store
            .tokens()
            .store_pair(&tokens.access_token, &tokens.refresh_token)
            .await
    }

    /// Drop the in-memory token cache
    pub fn clear_tokens(&self) {
        *self.tokens.write() = None;
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> ApiResponse<R> {
        self.request(HttpRequest::new(Method::GET, path)).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResponse<R> {
        self.request_with_body(Method::POST, path, body).await
    }

    pub async fn put<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResponse<R> {
        self.request_with_body(Method::PUT, path, body).await
    }

    pub async fn patch<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResponse<R> {
        self.request_with_body(Method::PATCH, path, body).await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> ApiResponse<R> {
        self.request(HttpRequest::new(Method::DELETE, path)).await
    }

    async fn request_with_body<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResponse<R> {
        match serde_json::to_value(body) {
            Ok(body) => self.request(HttpRequest::new(method, path).with_body(body)).await,
            Err(e) => ApiResponse::failure(ApiError::new(
                format!("Failed to serialize request body: {e}"),
                "INVALID_REQUEST",
            )),
        }
    }

    pub async fn request<R: DeserializeOwned>(&self, request: HttpRequest) -> ApiResponse<R> {
        into_envelope(self.execute(request).await)
    }

    /// Send with interceptors: attach bearer, refresh and retry once on 401
    async fn execute(&self, mut request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        if request.bearer.is_none() {
            request.bearer = self.access_token().await;
        }

        let response = self.transport.send(&request).await?;
        if response.status != 401 || request.retried || is_auth_endpoint(&request.path) {
            return Ok(response);
        }
        request.retried = true;

        // Another request may have rotated the token while this one was in flight
        let next_token = match self.access_token().await {
            Some(current) if request.bearer.as_deref() != Some(current.as_str()) => Ok(current),
            _ => self
                .refresh_access_token()
                .await
                .map(|payload| payload.tokens.access_token),
        };

        match next_token {
            Ok(token) => {
                debug!(path = %request.path, "Retrying request with refreshed token");
                request.bearer = Some(token);
                self.transport.send(&request).await
            }
            Err(reason) => {
                warn!(path = %request.path, error = %reason, "Token refresh failed after 401");
                self.force_logout().await;
                Ok(response)
            }
        }
    }

    /// Exchange the refresh token for a new pair, single-flight
    pub async fn refresh_access_token(&self) -> std::result::Result<AuthPayload, String> {
        let (payload, failure, _) = self
            .refresh_singleflight
            .work(REFRESH_FLIGHT_KEY, async {
                self.do_refresh().await.inspect_err(|reason| {
                    warn!(error = %reason, "Token refresh failed");
                })
            })
            .await;

        match (payload, failure) {
            (Some(payload), None) => Ok(payload),
            (None, Some(reason)) => Err(reason),
            _ => Err("Token refresh finished without an outcome".to_string()),
        }
    }

    async fn do_refresh(&self) -> std::result::Result<AuthPayload, String> {
        let refresh_token = self
            .refresh_token()
            .await
            .ok_or_else(|| "No refresh token available".to_string())?;

        let body = serde_json::to_value(RefreshRequest { refresh_token }).map_err(|e| e.to_string())?;
        let request = HttpRequest::new(Method::POST, REFRESH_PATH).with_body(body);
        let response: ApiResponse<AuthPayload> = into_envelope(self.transport.send(&request).await);

        if !response.success {
            let reason = response
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "Refresh rejected".to_string());
            return Err(reason);
        }
        let payload = response
            .data
            .ok_or_else(|| "Refresh response carried no tokens".to_string())?;

        self.set_tokens(&payload.tokens).await;
        self.store.store_user(&payload.user);
        info!(user_id = %payload.user.id, "Access token refreshed successfully");
        Ok(payload)
    }

    /// Terminal refresh failure: wipe local auth state and send the user to login
    async fn force_logout(&self) {
        let role = self
            .store
            .cached_user()
            .map(|user| user.role)
            .unwrap_or(Role::Student);

        self.auth_epoch.fetch_add(1, Ordering::SeqCst);
        self.clear_tokens();
        self.store.clear_all().await;
        self.navigator.clear_auth_cookies();

        let current = self.navigator.current_path();
        if is_login_page(&current) {
            debug!(path = %current, "Already on a login page, not redirecting");
            return;
        }
        let target = login_path_for(role);
        info!(role = %role, target = %target, "Session expired, redirecting to login");
        self.navigator.redirect(target);
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B) -> ApiResponse<AuthPayload> {
        let response: ApiResponse<AuthPayload> = self.post(path, body).await;
        if let Some(payload) = response.data.as_ref().filter(|_| response.success) {
            self.set_tokens(&payload.tokens).await;
        }
        response
    }

    pub async fn login(&self, credentials: &LoginRequest) -> ApiResponse<AuthPayload> {
        self.authenticate(LOGIN_PATH, credentials).await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> ApiResponse<AuthPayload> {
        self.authenticate(REGISTER_PATH, registration).await
    }

    pub async fn login_with_google(&self, request: &GoogleLoginRequest) -> ApiResponse<AuthPayload> {
        self.authenticate(GOOGLE_LOGIN_PATH, request).await
    }

    /// Backend logout; local state is left to the caller
    pub async fn logout(&self) -> ApiResponse<JsonValue> {
        let refresh_token = self.refresh_token().await;
        let body = serde_json::json!({ "refreshToken": refresh_token });
        self.post(LOGOUT_PATH, &body).await
    }
}
