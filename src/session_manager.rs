//! Session lifecycle: initialization, persistence, refresh, inactivity and logout

use crate::activity::{ActivityEvent, ActivityMonitor, ActivitySink};
use crate::clock::Clock;
use crate::config::SessionSettings;
use crate::http_client::{ApiClient, Transport};
use crate::navigation::{login_path_for, Navigator};
use crate::session_store::SessionStore;
use crate::token_store::TokenKind;
use crate::token_validator::TokenValidator;
use crate::types::*;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct CachedSession {
    session: Session,
    cached_at: i64,
    auth_epoch: u64,
}

/// Owner of the authoritative session for one client context
///
/// Constructed once per process and shared behind an `Arc`; the inactivity
/// monitor holds a weak reference back to it.
pub struct SessionManager<T: Transport> {
    api: Arc<ApiClient<T>>,
    validator: TokenValidator,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    snapshot: Mutex<Option<CachedSession>>,
    monitor: Mutex<Option<ActivityMonitor>>,
    self_ref: Weak<Self>,
}

impl<T: Transport> SessionManager<T> {
    /// Create the manager and migrate legacy persisted keys
    pub fn new(api: Arc<ApiClient<T>>, settings: SessionSettings, clock: Arc<dyn Clock>) -> Arc<Self> {
        let manager = Arc::new_cyclic(|self_ref| Self {
            api,
            validator: TokenValidator::new(Arc::clone(&clock)),
            settings,
            clock,
            snapshot: Mutex::new(None),
            monitor: Mutex::new(None),
            self_ref: self_ref.clone(),
        });
        manager.store().migrate_legacy();
        manager
    }

    pub fn api(&self) -> &Arc<ApiClient<T>> {
        &self.api
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    fn store(&self) -> &SessionStore {
        self.api.store()
    }

    fn navigator(&self) -> &Arc<dyn Navigator> {
        self.api.navigator()
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn default_expiry(&self, now: i64) -> i64 {
        now.saturating_add(self.settings.default_token_lifetime.as_millis() as i64)
    }

    /// Expiry from the token's `exp` claim, or the client-side default
    fn expiry_of(&self, access_token: &str, now: i64) -> i64 {
        self.validator
            .decode_token(access_token)
            .and_then(|payload| payload.exp_millis())
            .unwrap_or_else(|| self.default_expiry(now))
    }

    fn cache(&self, session: &Session) {
        *self.snapshot.lock() = Some(CachedSession {
            session: session.clone(),
            cached_at: self.now(),
            auth_epoch: self.api.auth_epoch(),
        });
    }

    /// Snapshot within its TTL whose tokens have not expired yet
    fn cached(&self) -> Option<Session> {
        self.discard_if_revoked();
        let ttl = self.settings.snapshot_ttl.as_millis() as i64;
        let now = self.now();
        let snapshot = self.snapshot.lock();
        snapshot
            .as_ref()
            .filter(|c| now.saturating_sub(c.cached_at) < ttl && c.session.is_fresh(now))
            .map(|c| c.session.clone())
    }

    /// Tear down the snapshot and monitor after the API client forced a logout
    fn discard_if_revoked(&self) {
        let epoch = self.api.auth_epoch();
        let revoked = {
            let mut snapshot = self.snapshot.lock();
            let stale = snapshot.as_ref().is_some_and(|c| c.auth_epoch != epoch);
            if stale {
                *snapshot = None;
            }
            stale
        };
        if revoked {
            info!("Auth state was cleared by the API client, dropping session");
            self.stop_monitoring();
        }
    }

    /// In-memory session snapshot, unless auth state was cleared underneath it
    pub fn current_session(&self) -> Option<Session> {
        self.discard_if_revoked();
        self.snapshot.lock().as_ref().map(|c| c.session.clone())
    }

    /// Resolve the current session from cache, then from storage
    ///
    /// Expired access tokens are refreshed. If the refresh fails, learner
    /// roles keep a best-effort session built from the stored tokens; every
    /// other role is logged out.
    pub async fn initialize_session(&self) -> Option<Session> {
        if let Some(session) = self.cached() {
            debug!(role = %session.role, "Serving cached session snapshot");
            return Some(session);
        }

        let tokens = self.store().tokens();
        let (Some(access_token), Some(refresh_token)) = (
            tokens.get(TokenKind::Access).await,
            tokens.get(TokenKind::Refresh).await,
        ) else {
            debug!("No stored tokens, session is logged out");
            *self.snapshot.lock() = None;
            return None;
        };

        let cached_user = self.store().cached_user();
        let Some(user) = cached_user.clone().or_else(|| self.user_from_token(&access_token)) else {
            warn!("Stored tokens without a usable user profile, clearing session");
            self.clear_session().await;
            return None;
        };
        let role = user.role;

        if self.validator.is_token_expired(&access_token) {
            info!(role = %role, "Access token expired, attempting refresh");
            match self.api.refresh_access_token().await {
                Ok(payload) => return self.activate_refreshed(payload, Some(role)).await,
                Err(reason) => {
                    if cached_user.as_ref().is_some_and(|u| u.role.is_learner()) {
                        warn!(
                            role = %role,
                            error = %reason,
                            "Refresh failed, keeping best-effort learner session"
                        );
                        let now = self.now();
                        let session = Session {
                            expires_at: self.expiry_of(&access_token, now),
                            last_activity: self.store().last_activity(role).unwrap_or(now),
                            user,
                            access_token,
                            refresh_token,
                            role,
                        };
                        self.ensure_monitoring(role);
                        self.cache(&session);
                        return Some(session);
                    }

                    warn!(role = %role, error = %reason, "Refresh failed, logging out");
                    self.clear_session().await;
                    return None;
                }
            }
        }

        if self.is_session_inactive(role) {
            self.handle_timeout(role).await;
            return None;
        }

        if self
            .validator
            .needs_refresh(&access_token, self.settings.refresh_threshold)
        {
            match self.api.refresh_access_token().await {
                Ok(payload) => return self.activate_refreshed(payload, Some(role)).await,
                Err(reason) => {
                    debug!(role = %role, error = %reason, "Early refresh failed, token still valid");
                }
            }
        }

        let now = self.now();
        self.store().touch(role, now);
        let session = Session {
            expires_at: self.expiry_of(&access_token, now),
            last_activity: self.store().last_activity(role).unwrap_or(now),
            user,
            access_token,
            refresh_token,
            role,
        };
        self.api
            .set_tokens(&TokenPair {
                access_token: session.access_token.clone(),
                refresh_token: session.refresh_token.clone(),
            })
            .await;
        self.ensure_monitoring(role);
        self.cache(&session);
        Some(session)
    }

    fn user_from_token(&self, access_token: &str) -> Option<UserProfile> {
        let payload = self.validator.decode_token(access_token)?;
        Some(UserProfile {
            id: payload.user_id?,
            email: payload.email?,
            role: Role::parse_lenient(payload.role.as_deref().unwrap_or_default()),
            status: None,
            subscription_tier: payload.subscription_tier,
            first_name: None,
            last_name: None,
            created_at: None,
            updated_at: None,
        })
    }

    /// Adopt a refreshed token pair; a role change ends the session
    async fn activate_refreshed(&self, payload: AuthPayload, expected: Option<Role>) -> Option<Session> {
        let role = payload.user.role;
        if let Some(expected) = expected.filter(|expected| *expected != role) {
            warn!(
                expected = %expected,
                received = %role,
                "Role changed during refresh, clearing session"
            );
            self.clear_session().await;
            return None;
        }

        let now = self.now();
        self.store().touch(role, now);
        let expires_at = self.default_expiry(now);
        self.store().set_expires_at(role, expires_at);
        self.store().set_authenticated(true);

        let session = Session {
            access_token: payload.tokens.access_token,
            refresh_token: payload.tokens.refresh_token,
            user: payload.user,
            expires_at,
            last_activity: now,
            role,
        };
        self.ensure_monitoring(role);
        self.cache(&session);
        Some(session)
    }

    /// Persist a fresh login and start monitoring its role
    ///
    /// Storage failures are logged; the returned session stays usable in memory.
    pub async fn save_session(&self, data: AuthPayload) -> Session {
        let now = self.now();
        let role = data.user.role;

        if !self.api.set_tokens(&data.tokens).await {
            warn!(role = %role, "Tokens could not be persisted, keeping them in memory only");
        }
        self.store().store_user(&data.user);
        self.store().touch(role, now);
        let expires_at = self.expiry_of(&data.tokens.access_token, now);
        self.store().set_expires_at(role, expires_at);
        self.store().set_authenticated(true);

        let session = Session {
            access_token: data.tokens.access_token,
            refresh_token: data.tokens.refresh_token,
            user: data.user,
            expires_at,
            last_activity: now,
            role,
        };

        self.restart_monitoring(role);
        self.cache(&session);
        info!(role = %role, user_id = %session.user.id, "Session saved");
        session
    }

    /// Exchange the refresh token; clears the session on failure
    pub async fn refresh_session(&self) -> Option<Session> {
        let expected = self.current_session().map(|session| session.role);
        match self.api.refresh_access_token().await {
            Ok(payload) => self.activate_refreshed(payload, expected).await,
            Err(reason) => {
                warn!(error = %reason, "Session refresh failed, clearing session");
                self.clear_session().await;
                None
            }
        }
    }

    pub fn is_session_inactive(&self, role: Role) -> bool {
        match self.store().last_activity(role) {
            Some(last) => self
                .settings
                .policy
                .is_expired(role, self.now().saturating_sub(last)),
            None => false,
        }
    }

    pub fn update_last_activity(&self, role: Role) {
        let now = self.now();
        self.store().touch(role, now);
        if let Some(cached) = self.snapshot.lock().as_mut() {
            if cached.session.role == role {
                cached.session.last_activity = cached.session.last_activity.max(now);
            }
        }
    }

    /// Feed a user interaction into the active session
    pub fn notify_activity(&self, event: ActivityEvent) {
        let role = match self.current_session() {
            Some(session) => session.role,
            None => return,
        };
        self.update_last_activity(role);
        if let Some(monitor) = self.monitor.lock().as_ref() {
            monitor.notify(event);
        }
    }

    fn ensure_monitoring(&self, role: Role) {
        let running = self
            .monitor
            .lock()
            .as_ref()
            .is_some_and(|m| m.role() == role && m.is_running());
        if !running {
            self.restart_monitoring(role);
        }
    }

    fn restart_monitoring(&self, role: Role) {
        self.stop_monitoring();
        let Some(timeout) = self.settings.policy.timeout_for(role) else {
            debug!(role = %role, "No inactivity timeout for role");
            return;
        };
        let monitor = ActivityMonitor::spawn(
            self.self_ref.clone(),
            role,
            timeout,
            self.settings.inactivity_check_interval,
        );
        *self.monitor.lock() = monitor;
    }

    fn stop_monitoring(&self) {
        // Dropping the handle closes the event channel and ends the task
        let previous = self.monitor.lock().take();
        drop(previous);
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(ActivityMonitor::is_running)
    }

    /// Wipe local auth state: tokens, user, role records, flags, cookies
    pub async fn clear_session(&self) {
        self.stop_monitoring();
        *self.snapshot.lock() = None;
        self.api.clear_tokens();
        if !self.store().clear_all().await {
            warn!("Some session keys could not be cleared from storage");
        }
        self.navigator().clear_auth_cookies();
    }

    /// Inactivity timeout: full clear and redirect to the role's login page
    pub async fn handle_timeout(&self, role: Role) {
        warn!(role = %role, "Session inactive, logging out");
        self.clear_session().await;
        self.navigator().redirect(login_path_for(role));
    }

    /// Best-effort backend logout, then local clear and redirect
    pub async fn logout(&self, role: Role) {
        let response = self.api.logout().await;
        if !response.success {
            debug!(
                error = ?response.error_code(),
                "Backend logout failed, clearing local session anyway"
            );
        }
        self.clear_session().await;
        info!(role = %role, "Logged out");
        self.navigator().redirect(login_path_for(role));
    }

    async fn establish(&self, response: ApiResponse<AuthPayload>) -> ApiResponse<Session> {
        match response {
            ApiResponse {
                success: true,
                data: Some(payload),
                message,
                ..
            } => {
                let session = self.save_session(payload).await;
                ApiResponse {
                    success: true,
                    data: Some(session),
                    message,
                    error: None,
                }
            }
            ApiResponse { message, error, .. } => ApiResponse {
                success: false,
                data: None,
                message,
                error,
            },
        }
    }

    pub async fn login(&self, credentials: &LoginRequest) -> ApiResponse<Session> {
        let response = self.api.login(credentials).await;
        self.establish(response).await
    }

    pub async fn register(&self, registration: &RegisterRequest) -> ApiResponse<Session> {
        let response = self.api.register(registration).await;
        self.establish(response).await
    }

    pub async fn login_with_google(&self, request: &GoogleLoginRequest) -> ApiResponse<Session> {
        let response = self.api.login_with_google(request).await;
        self.establish(response).await
    }
}

impl<T: Transport> ActivitySink for SessionManager<T> {
    fn is_inactive(&self, role: Role) -> bool {
        self.discard_if_revoked();
        self.is_session_inactive(role)
    }

    async fn on_inactivity_timeout(&self, role: Role) {
        self.handle_timeout(role).await;
    }
}
