//! Log in, resolve the session, call an endpoint, log out.
//!
//! ```sh
//! LINGUA_EMAIL=student@example.com LINGUA_PASSWORD=secret \
//!     cargo run --example basic_session
//! ```

use lingua_session::types::LoginRequest;
use lingua_session::{
    ApiClient, ClientConfig, FileStorage, NavigatorNoop, ReqwestTransport, Resource, SessionManager,
    SystemClock,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env()?;
    info!(base_url = %config.base_url, "Using API");

    let storage = FileStorage::open(std::env::temp_dir().join("lingua-session.json"))?;
    let transport = ReqwestTransport::new(&config)?;
    let api = Arc::new(ApiClient::new(transport, Arc::new(storage), Arc::new(NavigatorNoop)));
    let manager = SessionManager::new(api.clone(), config.session.clone(), Arc::new(SystemClock));

    let session = match manager.initialize_session().await {
        Some(session) => session,
        None => {
            let credentials = LoginRequest {
                email: std::env::var("LINGUA_EMAIL")?,
                password: std::env::var("LINGUA_PASSWORD")?,
            };
            let response = manager.login(&credentials).await;
            match response.data {
                Some(session) => session,
                None => {
                    warn!(error = ?response.error, "Login failed");
                    return Ok(());
                }
            }
        }
    };
    info!(role = %session.role, user_id = %session.user.id, "Session ready");

    let courses = api.list(Resource::Courses).await;
    match &courses.data {
        Some(courses) => info!(count = courses.as_array().map_or(0, Vec::len), "Fetched courses"),
        None => warn!(error = ?courses.error_code(), "Could not list courses"),
    }

    manager.logout(session.role).await;
    Ok(())
}
