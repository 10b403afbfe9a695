//! In-memory store backend.
//!
//! Used for local development (`store.backend = "memory"`) and as the test
//! double for [`KvStore`]. Mirrors the Redis hash semantics the service relies
//! on: empty hashes do not exist, increments create only the touched field,
//! and key enumeration has no defined order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::traits::KvStore;

/// Hash-per-key store backed by a concurrent map.
///
/// Cloning is cheap and every clone sees the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<DashMap<String, HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding at least one field.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|entry| !entry.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.data
            .get(key)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn set_hash_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entry = self.data.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self.data.entry(key.to_string()).or_default();
        let current = match entry.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::unavailable("hash value is not an integer"))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::unavailable("increment or decrement would overflow"))?;
        entry.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn get_hash_on_missing_key_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get_hash("user:nobody").await.unwrap_err();
        assert_eq!(err, StoreError::not_found("user:nobody"));
    }

    #[tokio::test]
    async fn set_hash_fields_overwrites_only_given_fields() {
        let store = InMemoryStore::new();
        store
            .set_hash_fields("user:a", &pairs(&[("sub", "a"), ("score", "3")]))
            .await
            .unwrap();
        store
            .set_hash_fields("user:a", &pairs(&[("nickname", "x"), ("score", "4")]))
            .await
            .unwrap();

        let fields = store.get_hash("user:a").await.unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["sub"], "a");
        assert_eq!(fields["nickname"], "x");
        assert_eq!(fields["score"], "4");
    }

    #[tokio::test]
    async fn set_with_no_fields_does_not_create_the_key() {
        let store = InMemoryStore::new();
        store.set_hash_fields("user:a", &[]).await.unwrap();
        assert!(store.get_hash("user:a").await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn increment_creates_only_the_field() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.increment_hash_field("user:a", "score", 1).await.unwrap(),
            1
        );
        assert_eq!(
            store.increment_hash_field("user:a", "score", 5).await.unwrap(),
            6
        );
        let fields = store.get_hash("user:a").await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["score"], "6");
    }

    #[tokio::test]
    async fn increment_on_non_integer_value_fails() {
        let store = InMemoryStore::new();
        store
            .set_hash_fields("user:a", &pairs(&[("score", "ten")]))
            .await
            .unwrap();
        let err = store
            .increment_hash_field("user:a", "score", 1)
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(store.get_hash("user:a").await.unwrap()["score"], "ten");
    }

    #[tokio::test]
    async fn concurrent_increments_are_atomic() {
        let store = InMemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store
                        .increment_hash_field("user:a", "score", 1)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_hash("user:a").await.unwrap()["score"], "800");
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = InMemoryStore::new();
        for key in ["user:a", "user:b", "session:a"] {
            store.increment_hash_field(key, "score", 1).await.unwrap();
        }
        let keys = store.list_keys_by_prefix("user:").await.unwrap();
        assert_eq!(
            keys,
            HashSet::from(["user:a".to_string(), "user:b".to_string()])
        );
        assert_eq!(store.backend_name(), "memory");
    }
}
