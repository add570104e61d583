//! Persisted session state: cached user, per-role records and auth flags

use crate::storage::KeyValueStore;
use crate::token_store::TokenStore;
use crate::types::{Role, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const USER_KEY: &str = "user";
pub const SESSIONS_KEY: &str = "sessions";
pub const AUTH_FLAG_KEY: &str = "isAuthenticated";

/// Pre-namespacing keys, read once by [`SessionStore::migrate_legacy`]
pub const LEGACY_ACTIVITY_KEY: &str = "lastActivity";
pub const LEGACY_SESSION_KEY: &str = "sessionData";

/// Per-role session metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySessionData {
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    last_activity: Option<i64>,
    #[serde(default)]
    role: Option<Role>,
}

/// Session persistence over a [`KeyValueStore`]
///
/// Every operation is fail-soft: reads degrade to `None`, writes report
/// `false` and log.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    tokens: TokenStore,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            tokens: TokenStore::new(Arc::clone(&storage)),
            storage,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.storage.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage write failed");
                false
            }
        }
    }

    fn remove(&self, key: &str) -> bool {
        match self.storage.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage remove failed");
                false
            }
        }
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable stored value");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.write(key, &raw),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value for storage");
                false
            }
        }
    }

    pub fn cached_user(&self) -> Option<UserProfile> {
        self.read_json(USER_KEY)
    }

    pub fn store_user(&self, user: &UserProfile) -> bool {
        self.write_json(USER_KEY, user)
    }

    pub fn records(&self) -> BTreeMap<Role, SessionRecord> {
        self.read_json(SESSIONS_KEY).unwrap_or_default()
    }

    pub fn record(&self, role: Role) -> Option<SessionRecord> {
        self.records().get(&role).copied()
    }

    fn update_record(&self, role: Role, f: impl FnOnce(&mut SessionRecord)) -> bool {
        let mut records = self.records();
        f(records.entry(role).or_default());
        self.write_json(SESSIONS_KEY, &records)
    }

    pub fn last_activity(&self, role: Role) -> Option<i64> {
        self.record(role).and_then(|r| r.last_activity)
    }

    /// Bump the role's activity timestamp; never moves it backwards
    pub fn touch(&self, role: Role, now: i64) -> bool {
        self.update_record(role, |record| {
            record.last_activity = Some(record.last_activity.map_or(now, |prev| prev.max(now)));
        })
    }

    pub fn set_expires_at(&self, role: Role, expires_at: i64) -> bool {
        self.update_record(role, |record| record.expires_at = Some(expires_at))
    }

    pub fn set_authenticated(&self, authenticated: bool) -> bool {
        if authenticated {
            self.write(AUTH_FLAG_KEY, "true")
        } else {
            self.remove(AUTH_FLAG_KEY)
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(AUTH_FLAG_KEY).as_deref() == Some("true")
    }

    /// Move legacy non-namespaced activity/session keys into the role map
    ///
    /// Returns whether anything was migrated. An existing role record wins
    /// over legacy values.
    pub fn migrate_legacy(&self) -> bool {
        let legacy_activity = self
            .read(LEGACY_ACTIVITY_KEY)
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        let legacy_session: Option<LegacySessionData> = self.read_json(LEGACY_SESSION_KEY);

        if legacy_activity.is_none() && legacy_session.is_none() {
            return false;
        }

        let role = legacy_session
            .as_ref()
            .and_then(|s| s.role)
            .or_else(|| self.cached_user().map(|u| u.role))
            .unwrap_or(Role::Student);

        let last_activity = legacy_activity.or(legacy_session.as_ref().and_then(|s| s.last_activity));
        let expires_at = legacy_session.as_ref().and_then(|s| s.expires_at);

        let mut records = self.records();
        let migrated = !records.contains_key(&role);
        if migrated {
            records.insert(
                role,
                SessionRecord {
                    last_activity,
                    expires_at,
                },
            );
            self.write_json(SESSIONS_KEY, &records);
            info!(role = %role, "Migrated legacy session keys");
        } else {
            debug!(role = %role, "Role record already present, dropping legacy session keys");
        }

        self.remove(LEGACY_ACTIVITY_KEY);
        self.remove(LEGACY_SESSION_KEY);
        migrated
    }

    /// Remove tokens, cached user, role records, flags and legacy keys
    pub async fn clear_all(&self) -> bool {
        let mut ok = self.tokens.clear().await;
        for key in [
            USER_KEY,
            SESSIONS_KEY,
            AUTH_FLAG_KEY,
            LEGACY_ACTIVITY_KEY,
            LEGACY_SESSION_KEY,
        ] {
            ok &= self.remove(key);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_support::{sample_user, FailingStorage};
    use crate::token_store::TokenKind;

    fn store() -> (MemoryStorage, SessionStore) {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(Arc::new(storage.clone()));
        (storage, store)
    }

    #[test]
    fn user_round_trip() {
        let (_, store) = store();
        let user = sample_user("u1", Role::JuniorManager);
        assert!(store.store_user(&user));
        assert_eq!(store.cached_user(), Some(user));
    }

    #[test]
    fn records_are_namespaced_by_role() {
        let (_, store) = store();
        store.touch(Role::Student, 1_000);
        store.touch(Role::Admin, 5_000);
        store.set_expires_at(Role::Student, 9_000);

        assert_eq!(
            store.record(Role::Student),
            Some(SessionRecord {
                last_activity: Some(1_000),
                expires_at: Some(9_000),
            })
        );
        assert_eq!(store.last_activity(Role::Admin), Some(5_000));
        assert_eq!(store.last_activity(Role::SeniorManager), None);
    }

    #[test]
    fn touch_is_monotonic() {
        let (_, store) = store();
        store.touch(Role::Student, 2_000);
        store.touch(Role::Student, 1_000);
        assert_eq!(store.last_activity(Role::Student), Some(2_000));
    }

    #[test]
    fn legacy_keys_migrate_once() {
        let (storage, store) = store();
        store.store_user(&sample_user("u1", Role::SeniorManager));
        storage.set(LEGACY_ACTIVITY_KEY, "12345").unwrap();
        storage
            .set(LEGACY_SESSION_KEY, r#"{"expiresAt": 99999}"#)
            .unwrap();

        assert!(store.migrate_legacy());
        assert_eq!(
            store.record(Role::SeniorManager),
            Some(SessionRecord {
                last_activity: Some(12_345),
                expires_at: Some(99_999),
            })
        );
        assert!(storage.get(LEGACY_ACTIVITY_KEY).unwrap().is_none());
        assert!(storage.get(LEGACY_SESSION_KEY).unwrap().is_none());
        assert!(!store.migrate_legacy());
    }

    #[test]
    fn legacy_keys_do_not_overwrite_existing_record() {
        let (storage, store) = store();
        store.touch(Role::Student, 50_000);
        storage.set(LEGACY_ACTIVITY_KEY, "10").unwrap();

        assert!(!store.migrate_legacy());
        assert_eq!(store.last_activity(Role::Student), Some(50_000));
        assert!(storage.get(LEGACY_ACTIVITY_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_all_removes_everything() {
        let (storage, store) = store();
        store.tokens().store_pair("a", "r").await;
        store.store_user(&sample_user("u1", Role::Student));
        store.touch(Role::Student, 1);
        store.set_authenticated(true);
        storage.set(LEGACY_ACTIVITY_KEY, "1").unwrap();

        assert!(store.clear_all().await);
        assert!(storage.keys().is_empty());
        assert!(store.tokens().get(TokenKind::Access).await.is_none());
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn failing_storage_degrades_to_absent() {
        let store = SessionStore::new(Arc::new(FailingStorage));
        assert!(!store.store_user(&sample_user("u1", Role::Student)));
        assert!(store.cached_user().is_none());
        assert!(!store.touch(Role::Student, 1));
        assert!(store.last_activity(Role::Student).is_none());
        assert!(!store.migrate_legacy());
        assert!(!store.clear_all().await);
    }
}
