//! Storage scopes for persisted flags.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// A key/value storage scope.
///
/// Two scopes exist at runtime: durable (survives sessions) and ephemeral
/// (cleared when the session ends). `FlagStore` is the only caller and
/// treats every error as a no-op.
#[async_trait]
pub trait FlagScope: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key starting with `prefix`.
    async fn clear_prefix(&self, prefix: &str) -> Result<(), StorageError>;
}

/// In-memory scope. Serves as the ephemeral per-session scope, and as the
/// durable scope in tests and the demo shell.
pub struct MemoryScope {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryScope {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryScope {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlagScope for MemoryScope {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_scope_crud() {
        let scope = MemoryScope::new();
        assert_eq!(scope.get("a").await.unwrap(), None);

        scope.set("a", "1").await.unwrap();
        assert_eq!(scope.get("a").await.unwrap(), Some("1".to_string()));

        scope.set("a", "2").await.unwrap();
        assert_eq!(scope.get("a").await.unwrap(), Some("2".to_string()));

        scope.remove("a").await.unwrap();
        assert_eq!(scope.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_prefix_spares_other_keys() {
        let scope = MemoryScope::new();
        scope.set("onboarding.a", "1").await.unwrap();
        scope.set("onboarding.b", "2").await.unwrap();
        scope.set("theme", "dark").await.unwrap();

        scope.clear_prefix("onboarding.").await.unwrap();

        assert_eq!(scope.get("onboarding.a").await.unwrap(), None);
        assert_eq!(scope.get("onboarding.b").await.unwrap(), None);
        assert_eq!(scope.get("theme").await.unwrap(), Some("dark".to_string()));
    }
}
