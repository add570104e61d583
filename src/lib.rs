//! Lingua Session
//!
//! Client-side authentication and session management for the Lingua Academy
//! platform: JWT inspection, fail-soft token persistence, role-based
//! inactivity timeouts, and an API client with single-flight token refresh.

pub mod activity;
pub mod clock;
pub mod config;
pub mod error;
pub mod http_client;
pub mod navigation;
pub mod resources;
pub mod session_manager;
pub mod session_policy;
pub mod session_store;
pub mod storage;
pub mod token_store;
pub mod token_validator;
pub mod types;

#[cfg(test)]
mod test_support;

pub use activity::{ActivityEvent, ActivityMonitor};
pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, Environment, SessionSettings};
pub use error::{ClientError, Result, StorageError, TransportError};
pub use http_client::{ApiClient, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use navigation::{login_path_for, Navigator, NavigatorNoop};
pub use resources::Resource;
pub use session_manager::SessionManager;
pub use session_policy::SessionPolicy;
pub use storage::{FileStorage, KeyValueStore, MemoryStorage};
pub use token_store::{TokenKind, TokenStore};
pub use token_validator::{TokenPayload, TokenValidation, TokenValidator};
pub use types::{ApiResponse, AuthPayload, Role, Session, TokenPair, UserProfile};
