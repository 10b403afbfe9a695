pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod leaderboard;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod profiles;
pub mod server;

use std::sync::Arc;

use profilecache_storage::{DynStore, InMemoryStore, RedisStore, StoreError};

pub use config::{AppConfig, StoreBackend};
pub use error::ApiError;
pub use identity::{HttpIdentityProvider, IdentityError, IdentityProvider};
pub use leaderboard::{Leaderboard, ProfileSource};
pub use observability::init_tracing;
pub use profiles::{CacheLookupError, ProfileError, ProfileService};
pub use server::{AppState, ProfileCacheServer, ServerBuilder, build_app};

/// Create the profile store selected by `store.backend`.
///
/// ## Backends
///
/// - **memory**: process-local map, nothing to connect
/// - **redis**: creates the connection pool and opens one connection
///
/// A Redis backend that cannot connect is an error; there is no fallback to
/// the in-memory store.
pub async fn create_store(config: &AppConfig) -> Result<DynStore, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory profile store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Redis => {
            tracing::info!(url = %redact_url(&config.redis.url), "Connecting to Redis");
            let store = RedisStore::connect(&config.redis.options())
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to connect to Redis"))?;
            tracing::info!("Connected to Redis successfully");
            Ok(Arc::new(store))
        }
    }
}

/// Replaces the password of a `redis://` URL for logging.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let userinfo = &url[scheme_end + 3..at];
            let user = userinfo.split(':').next().unwrap_or("");
            format!("{}{user}:***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}
