//! # profilecache-storage
//!
//! Store abstraction for profile records.
//!
//! The [`KvStore`] trait is the whole contract the profile service needs from
//! its backing store: read a hash, write some of its fields, atomically
//! increment one field, and enumerate keys by prefix.
//!
//! ## Backends
//!
//! - [`RedisStore`] - production backend over a `deadpool-redis` pool
//! - [`InMemoryStore`] - process-local map for development and tests
//!
//! ## Example
//!
//! ```ignore
//! use profilecache_storage::{InMemoryStore, KvStore};
//!
//! let store = InMemoryStore::new();
//! let score = store.increment_hash_field("user:abc", "score", 1).await?;
//! assert_eq!(score, 1);
//! ```

mod error;
pub mod memory;
pub mod redis_store;
mod traits;

pub use error::{ErrorCategory, StoreError};
pub use memory::InMemoryStore;
pub use redis_store::{RedisOptions, RedisStore};
pub use traits::KvStore;

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn KvStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use profilecache_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StoreError};
    pub use crate::traits::KvStore;
    pub use crate::{DynStore, StoreResult};
}
