//! Fail-soft access/refresh token slots

use crate::storage::KeyValueStore;
use crate::token_validator::has_valid_structure;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Which of the two token slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn storage_key(&self) -> &'static str {
        match self {
            Self::Access => ACCESS_TOKEN_KEY,
            Self::Refresh => REFRESH_TOKEN_KEY,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        })
    }
}

/// Token storage over a [`KeyValueStore`]
///
/// Storage failures are logged and surface as `false`/`None`, never as errors.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Store a token; returns whether the write succeeded
    pub async fn store(&self, kind: TokenKind, value: &str) -> bool {
        match self.storage.set(kind.storage_key(), value) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to store token");
                false
            }
        }
    }

    /// Store both tokens of a pair
    pub async fn store_pair(&self, access_token: &str, refresh_token: &str) -> bool {
        let access = self.store(TokenKind::Access, access_token).await;
        let refresh = self.store(TokenKind::Refresh, refresh_token).await;
        access && refresh
    }

    pub async fn get(&self, kind: TokenKind) -> Option<String> {
        match self.storage.get(kind.storage_key()) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to read token");
                None
            }
        }
    }

    /// Remove both tokens
    pub async fn clear(&self) -> bool {
        let mut ok = true;
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            if let Err(e) = self.storage.remove(kind.storage_key()) {
                warn!(kind = %kind, error = %e, "Failed to clear token");
                ok = false;
            }
        }
        ok
    }

    /// Both tokens present
    pub async fn has_tokens(&self) -> bool {
        self.get(TokenKind::Access).await.is_some() && self.get(TokenKind::Refresh).await.is_some()
    }

    /// Structural check only, same rule as the validator
    pub fn is_valid_token(&self, token: &str) -> bool {
        has_valid_structure(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_support::{make_token, standard_claims, FailingStorage};

    #[tokio::test]
    async fn test_token_store() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));

        assert!(store.store(TokenKind::Access, "access_token_123").await);
        assert_eq!(
            store.get(TokenKind::Access).await.as_deref(),
            Some("access_token_123")
        );
        assert!(!store.has_tokens().await);

        assert!(store.store(TokenKind::Refresh, "refresh_token_456").await);
        assert!(store.has_tokens().await);

        assert!(store.clear().await);
        assert!(store.get(TokenKind::Access).await.is_none());
        assert!(store.get(TokenKind::Refresh).await.is_none());
        assert!(!store.has_tokens().await);
    }

    #[tokio::test]
    async fn storage_failures_are_soft() {
        let store = TokenStore::new(Arc::new(FailingStorage));

        assert!(!store.store(TokenKind::Access, "x").await);
        assert!(store.get(TokenKind::Access).await.is_none());
        assert!(!store.has_tokens().await);
        assert!(!store.clear().await);
    }

    #[test]
    fn structural_token_check() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        assert!(store.is_valid_token(&make_token(standard_claims("u1", "ADMIN", 1, 2))));
        assert!(!store.is_valid_token("a.b"));
        assert!(!store.is_valid_token("a..c"));
        assert!(!store.is_valid_token("a.b$.c"));
    }
}
