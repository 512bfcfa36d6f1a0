use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Persists active unique tokens: one live record per `(account, system
/// name)`. Invalidating an account revokes every live record for it,
/// regardless of system name — the merge flow depends on that all-for-account
/// semantics (see DESIGN.md).
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(
        &self,
        account: &str,
        name: &str,
        uuid: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenStoreError>;

    async fn invalidate_account(&self, account: &str) -> Result<(), TokenStoreError>;

    /// Exposed for tests asserting exactly one live token per `(account, name)`.
    async fn is_live(&self, account: &str, name: &str, uuid: &str) -> bool;
}

#[derive(Clone, Debug)]
struct LiveToken {
    uuid: String,
    expires_at: DateTime<Utc>,
}

/// Reference in-process implementation, a stand-in for the real key/value
/// token store a deployment would run.
#[derive(Default)]
pub struct InMemoryTokenStore {
    live: Mutex<HashMap<(String, String), LiveToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save(
        &self,
        account: &str,
        name: &str,
        uuid: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokenStoreError> {
        self.live.lock().unwrap().insert(
            (account.to_string(), name.to_string()),
            LiveToken {
                uuid: uuid.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn invalidate_account(&self, account: &str) -> Result<(), TokenStoreError> {
        self.live
            .lock()
            .unwrap()
            .retain(|(acc, _), _| acc != account);
        Ok(())
    }

    async fn is_live(&self, account: &str, name: &str, uuid: &str) -> bool {
        self.live
            .lock()
            .unwrap()
            .get(&(account.to_string(), name.to_string()))
            .map(|t| t.uuid == uuid)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saving_a_new_token_replaces_the_old_one_for_the_same_name() {
        let store = InMemoryTokenStore::new();
        store.save("2", "def", "uuid-1", Utc::now()).await.unwrap();
        store.save("2", "def", "uuid-2", Utc::now()).await.unwrap();
        assert!(!store.is_live("2", "def", "uuid-1").await);
        assert!(store.is_live("2", "def", "uuid-2").await);
    }

    #[tokio::test]
    async fn invalidate_account_clears_every_system_name() {
        let store = InMemoryTokenStore::new();
        store.save("2", "def", "uuid-1", Utc::now()).await.unwrap();
        store.save("2", "www", "uuid-2", Utc::now()).await.unwrap();
        store.invalidate_account("2").await.unwrap();
        assert!(!store.is_live("2", "def", "uuid-1").await);
        assert!(!store.is_live("2", "www", "uuid-2").await);
    }
}
