//! Store trait for the profile record layer.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::StoreError;

/// A remote store holding one hash record (field → string) per key.
///
/// Implementations must be safe to share between request tasks
/// (`Send + Sync`); they are held behind an `Arc` and every call is an
/// independent round trip.
///
/// # Example
///
/// ```ignore
/// use profilecache_storage::{KvStore, StoreError};
///
/// async fn score_of(store: &dyn KvStore, key: &str) -> Result<Option<String>, StoreError> {
///     match store.get_hash(key).await {
///         Ok(fields) => Ok(fields.get("score").cloned()),
///         Err(e) if e.is_not_found() => Ok(None),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns every field of the hash stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key holds no fields.
    /// Returns `StoreError::Unavailable` on transport or store errors.
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Sets the given fields, leaving any other field of the hash untouched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` on transport or store errors.
    async fn set_hash_fields(&self, key: &str, fields: &[(String, String)])
    -> Result<(), StoreError>;

    /// Atomically adds `delta` to an integer field and returns the new value.
    ///
    /// A missing key or field starts from zero, so the first call yields
    /// `delta`. Only `field` is created; the rest of the hash is left as is.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` on transport errors or when the
    /// current value is not an integer.
    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError>;

    /// Lists every key starting with `prefix`, in no particular order.
    ///
    /// Cost is proportional to the total number of keys in the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` on transport or store errors.
    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<HashSet<String>, StoreError>;

    /// Verifies that the backend is reachable.
    ///
    /// Backends without a remote connection are always healthy.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
