use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GamespaceError {
    #[error("gamespace '{0}' was not found")]
    NotFound(String),
}

/// Resolves gamespace names to ids and reports the scopes a gamespace grants
/// to every account within it.
#[async_trait]
pub trait GamespaceCatalog: Send + Sync {
    async fn find_gamespace(&self, name: &str) -> Result<String, GamespaceError>;
    async fn get_gamespace_access_scopes(
        &self,
        gamespace_id: &str,
    ) -> Result<BTreeSet<String>, GamespaceError>;
}

/// Per-account scope grants within a gamespace (e.g. `auth_non_unique`
/// granted to a trusted service account).
#[async_trait]
pub trait ScopeResolver: Send + Sync {
    async fn get_account_access(
        &self,
        gamespace_id: &str,
        account: &str,
    ) -> BTreeSet<String>;
}

/// In-memory reference implementation of both traits, suitable for tests and
/// small deployments that don't need a separate catalog service.
#[derive(Default)]
pub struct InMemoryGamespaces {
    by_name: RwLock<HashMap<String, String>>,
    gamespace_scopes: RwLock<HashMap<String, BTreeSet<String>>>,
    account_scopes: RwLock<HashMap<(String, String), BTreeSet<String>>>,
}

impl InMemoryGamespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_gamespace(&self, name: &str, id: &str, scopes: BTreeSet<String>) {
        self.by_name
            .write()
            .unwrap()
            .insert(name.to_string(), id.to_string());
        self.gamespace_scopes
            .write()
            .unwrap()
            .insert(id.to_string(), scopes);
    }

    pub fn grant_account_scope(&self, gamespace_id: &str, account: &str, scope: &str) {
        self.account_scopes
            .write()
            .unwrap()
            .entry((gamespace_id.to_string(), account.to_string()))
            .or_default()
            .insert(scope.to_string());
    }
}

#[async_trait]
impl GamespaceCatalog for InMemoryGamespaces {
    async fn find_gamespace(&self, name: &str) -> Result<String, GamespaceError> {
        self.by_name
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GamespaceError::NotFound(name.to_string()))
    }

    async fn get_gamespace_access_scopes(
        &self,
        gamespace_id: &str,
    ) -> Result<BTreeSet<String>, GamespaceError> {
        self.gamespace_scopes
            .read()
            .unwrap()
            .get(gamespace_id)
            .cloned()
            .ok_or_else(|| GamespaceError::NotFound(gamespace_id.to_string()))
    }
}

#[async_trait]
impl ScopeResolver for InMemoryGamespaces {
    async fn get_account_access(&self, gamespace_id: &str, account: &str) -> BTreeSet<String> {
        self.account_scopes
            .read()
            .unwrap()
            .get(&(gamespace_id.to_string(), account.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_registered_gamespace_by_name() {
        let catalog = InMemoryGamespaces::new();
        catalog.register_gamespace("prod", "7", BTreeSet::from(["profile".to_string()]));
        assert_eq!(catalog.find_gamespace("prod").await.unwrap(), "7");
        assert!(catalog.find_gamespace("missing").await.is_err());
    }

    #[tokio::test]
    async fn account_scopes_default_to_empty() {
        let catalog = InMemoryGamespaces::new();
        let scopes = catalog.get_account_access("7", "2").await;
        assert!(scopes.is_empty());
    }
}
