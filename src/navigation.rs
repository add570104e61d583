//! Redirect capability and role login surfaces

use crate::types::Role;
use tracing::info;

/// Navigation side effects of the host environment
pub trait Navigator: Send + Sync + 'static {
    /// Path of the page currently displayed
    fn current_path(&self) -> String;

    fn redirect(&self, path: &str);

    /// Drop auth cookies held by the host, if it has any
    fn clear_auth_cookies(&self) {}
}

/// Navigator for hosts without pages: logs redirects and does nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigatorNoop;

impl Navigator for NavigatorNoop {
    fn current_path(&self) -> String {
        "/".to_string()
    }

    fn redirect(&self, path: &str) {
        info!(path = %path, "Redirect requested");
    }
}

/// Login page for a role
pub fn login_path_for(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin/login",
        Role::SeniorManager | Role::JuniorManager => "/manager/login",
        Role::Student | Role::User => "/connexion",
    }
}

/// Login-type pages never trigger a redirect to themselves
pub fn is_login_page(path: &str) -> bool {
    path.starts_with("/connexion")
        || path.starts_with("/inscription")
        || path.contains("/login")
        || path.contains("/register")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_paths_per_role() {
        assert_eq!(login_path_for(Role::Student), "/connexion");
        assert_eq!(login_path_for(Role::User), "/connexion");
        assert_eq!(login_path_for(Role::Admin), "/admin/login");
        assert_eq!(login_path_for(Role::JuniorManager), "/manager/login");
    }

    #[test]
    fn every_login_path_is_a_login_page() {
        for role in [Role::Student, Role::User, Role::JuniorManager, Role::SeniorManager, Role::Admin] {
            assert!(is_login_page(login_path_for(role)));
        }
        assert!(is_login_page("/inscription?step=2"));
        assert!(!is_login_page("/dashboard/courses"));
        assert!(!is_login_page("/"));
    }
}
