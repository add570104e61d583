//! Client configuration

use crate::error::{ClientError, Result};
use crate::session_policy::SessionPolicy;
use crate::token_validator::DEFAULT_REFRESH_THRESHOLD;
use std::time::Duration;
use url::Url;

pub const PRODUCTION_API_URL: &str = "https://api.lingua-academy.com/api";
pub const DEVELOPMENT_API_URL: &str = "http://localhost:3001/api";

/// Build environment, selects the default API base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_API_URL,
            Self::Development => DEVELOPMENT_API_URL,
        }
    }
}

/// Session lifecycle tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long `initialize_session` may serve the cached snapshot
    pub snapshot_ttl: Duration,
    /// Client-side lifetime assumed for a freshly issued access token
    pub default_token_lifetime: Duration,
    /// Valid access tokens this close to expiry are refreshed ahead of time
    pub refresh_threshold: Duration,
    /// Backstop inactivity check period
    pub inactivity_check_interval: Duration,
    pub policy: SessionPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(5 * 60),
            default_token_lifetime: Duration::from_secs(15 * 60),
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            inactivity_check_interval: Duration::from_secs(60),
            policy: SessionPolicy::default(),
        }
    }
}

/// Configuration for the API client and session manager
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    /// API base URL, without trailing slash
    pub base_url: String,
    pub request_timeout: Duration,
    pub session: SessionSettings,
}

impl ClientConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            base_url: environment.default_base_url().to_string(),
            request_timeout: Duration::from_secs(30),
            session: SessionSettings::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// - `LINGUA_ENV`: `production` or `development` (default)
    /// - `LINGUA_API_URL`: optional base URL override
    pub fn from_env() -> Result<Self> {
        let environment = match std::env::var("LINGUA_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("development") | Ok("dev") | Err(_) => Environment::Development,
            Ok(other) => {
                return Err(ClientError::Configuration(format!(
                    "LINGUA_ENV must be 'production' or 'development', got '{other}'"
                )))
            }
        };

        let mut config = Self::new(environment);
        if let Ok(url) = std::env::var("LINGUA_API_URL") {
            config = config.with_base_url(&url)?;
        }
        Ok(config)
    }

    /// Override the base URL; must be an absolute http(s) URL
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let parsed: Url = base_url
            .parse()
            .map_err(|e| ClientError::Configuration(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_settings(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.session.policy = policy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}
