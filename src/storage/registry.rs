//! Namespace → adapter registry.
//!
//! One trait object per namespace, looked up by string key, with a default
//! namespace used when a path carries none.

use super::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The byte/listing contract the loader consumes. A concrete implementation
/// (e.g. `FilesystemAdapter`) is bound to exactly one namespace.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;
    async fn compute_last_modified_time(&self, path: &str) -> StorageResult<Option<DateTime<Utc>>>;
    async fn list_children(&self, path: &str) -> StorageResult<Vec<String>>;
}

#[derive(Default)]
pub struct NamespaceRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
    default_namespace: RwLock<String>,
}

impl NamespaceRegistry {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            default_namespace: RwLock::new(default_namespace.into()),
        }
    }

    pub fn mount(&self, namespace: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.write().insert(namespace.into(), adapter);
    }

    pub fn default_namespace(&self) -> String {
        self.default_namespace.read().clone()
    }

    pub fn set_default_namespace(&self, namespace: impl Into<String>) {
        *self.default_namespace.write() = namespace.into();
    }

    pub fn adapter(&self, namespace: &str) -> StorageResult<Arc<dyn Adapter>> {
        self.adapters
            .read()
            .get(namespace)
            .cloned()
            .ok_or_else(|| StorageError::UnknownNamespace(namespace.to_string()))
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.adapters.read().contains_key(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyAdapter;

    #[async_trait]
    impl Adapter for EmptyAdapter {
        async fn read(&self, _path: &str) -> StorageResult<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn compute_last_modified_time(
            &self,
            _path: &str,
        ) -> StorageResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
        async fn list_children(&self, _path: &str) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn unregistered_namespace_errors() {
        let registry = NamespaceRegistry::new("default");
        assert!(matches!(
            registry.adapter("missing"),
            Err(StorageError::UnknownNamespace(_))
        ));
    }

    #[test]
    fn mounted_namespace_is_found() {
        let registry = NamespaceRegistry::new("default");
        registry.mount("default", Arc::new(EmptyAdapter));
        assert!(registry.adapter("default").is_ok());
    }
}
