//! Cache-aside profile service.
//!
//! The store is the cache and the identity provider the source of truth.
//! A read that misses the store (or finds a record whose score is unusable)
//! is filled from the provider and written back before returning. Score
//! increments touch the store only.

use std::sync::Arc;

use async_trait::async_trait;
use profilecache_core::{DecodeError, HashSchema, KeySpace, Profile, ScoreUpdate};
use profilecache_storage::{DynStore, StoreError};

use crate::identity::IdentityProvider;
use crate::leaderboard::ProfileSource;
use crate::metrics;

/// Why a store-only lookup produced no profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheLookupError {
    /// No record under the subject's key.
    #[error("no cached profile")]
    Miss,

    /// A record exists but its score is absent or not an integer.
    #[error("malformed cached profile: {0}")]
    Malformed(#[from] DecodeError),

    /// The store could not be reached.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CacheLookupError {
    fn from(e: StoreError) -> Self {
        if e.is_not_found() {
            CacheLookupError::Miss
        } else {
            CacheLookupError::Store(e)
        }
    }
}

/// Errors surfaced by [`ProfileService`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// The store had no usable record and the provider could not supply one.
    #[error("profile unavailable for subject {subject}")]
    ProfileUnavailable { subject: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<StoreError> for ProfileError {
    fn from(e: StoreError) -> Self {
        ProfileError::StoreUnavailable(e)
    }
}

/// Profile reads, score increments and listing over a shared store.
#[derive(Clone)]
pub struct ProfileService {
    store: DynStore,
    provider: Arc<dyn IdentityProvider>,
    keys: KeySpace,
    schema: HashSchema,
}

impl ProfileService {
    pub fn new(store: DynStore, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            provider,
            keys: KeySpace::default(),
            schema: HashSchema::default(),
        }
    }

    pub fn with_key_space(mut self, keys: KeySpace) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_schema(mut self, schema: HashSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    /// Store-only lookup of `subject`, applying the record decoding rules.
    pub async fn read_cached(&self, subject: &str) -> Result<Profile, CacheLookupError> {
        self.read_key(&self.keys.key_for(subject)).await
    }

    async fn read_key(&self, key: &str) -> Result<Profile, CacheLookupError> {
        let fields = self.store.get_hash(key).await?;
        Ok(self.schema.decode(&fields)?)
    }

    /// Returns the profile of `subject`, populating the store from the
    /// identity provider on a miss.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty subject
    /// - `StoreUnavailable` if the store cannot be read or written; the
    ///   provider is not consulted when the read fails
    /// - `ProfileUnavailable` if the provider cannot supply the profile
    pub async fn get_profile(&self, subject: &str) -> Result<Profile, ProfileError> {
        ensure_subject(subject)?;

        match self.read_cached(subject).await {
            Ok(profile) => {
                metrics::record_cache_hit();
                return Ok(profile);
            }
            Err(CacheLookupError::Miss) => {
                metrics::record_cache_miss("miss");
                tracing::debug!(subject = %subject, "Profile not cached");
            }
            Err(CacheLookupError::Malformed(e)) => {
                metrics::record_cache_miss("malformed");
                tracing::debug!(subject = %subject, error = %e, "Cached profile unusable, refetching");
            }
            Err(CacheLookupError::Store(e)) => {
                tracing::error!(subject = %subject, error = %e, "Failed to read cached profile");
                return Err(ProfileError::StoreUnavailable(e));
            }
        }

        let profile = match self.provider.fetch_profile(subject).await {
            Ok(profile) => {
                metrics::record_identity_fetch("ok");
                profile
            }
            Err(e) => {
                metrics::record_identity_fetch(e.outcome());
                tracing::error!(subject = %subject, error = %e, "Failed to fetch profile");
                return Err(ProfileError::ProfileUnavailable {
                    subject: subject.to_string(),
                });
            }
        };

        let key = self.keys.key_for(subject);
        self.store
            .set_hash_fields(&key, &self.schema.encode(&profile))
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %e, "Failed to cache fetched profile");
                ProfileError::StoreUnavailable(e)
            })?;

        Ok(profile)
    }

    /// Adds one to the score of `subject` and returns the new score with the
    /// stored profile.
    ///
    /// An unseen subject gets a record holding only the score; the provider
    /// is never consulted. `new_score` is the increment's own result and may
    /// differ from `profile.score` under concurrent increments.
    pub async fn increment_score(&self, subject: &str) -> Result<ScoreUpdate, ProfileError> {
        ensure_subject(subject)?;

        let key = self.keys.key_for(subject);
        let new_score = self
            .store
            .increment_hash_field(&key, &self.schema.score, 1)
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %e, "Failed to increment score");
                ProfileError::StoreUnavailable(e)
            })?;
        metrics::record_score_increment();

        let profile = self.read_key(&key).await.map_err(|e| {
            tracing::error!(key = %key, error = %e, "Failed to re-read profile after increment");
            match e {
                CacheLookupError::Store(e) => ProfileError::StoreUnavailable(e),
                other => ProfileError::StoreUnavailable(StoreError::unavailable(format!(
                    "record at {key} changed during increment: {other}"
                ))),
            }
        })?;

        tracing::info!(subject = %subject, new_score, "Score incremented");
        Ok(ScoreUpdate { new_score, profile })
    }

    /// Every profile in the store whose record decodes.
    ///
    /// Records that cannot be read are logged and skipped; only a failed key
    /// enumeration fails the call.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ProfileError> {
        Ok(self
            .list_keyed_profiles()
            .await?
            .into_iter()
            .map(|(_, profile)| profile)
            .collect())
    }

    /// Like [`list_profiles`](Self::list_profiles), paired with the subject
    /// each record is stored under.
    pub async fn list_keyed_profiles(&self) -> Result<Vec<(String, Profile)>, ProfileError> {
        let keys = self
            .store
            .list_keys_by_prefix(self.keys.prefix())
            .await
            .map_err(|e| {
                tracing::error!(prefix = %self.keys.prefix(), error = %e, "Failed to enumerate profiles");
                ProfileError::StoreUnavailable(e)
            })?;

        let mut profiles = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(subject) = self.keys.subject_of(key) else {
                continue;
            };
            match self.read_key(key).await {
                Ok(profile) => profiles.push((subject.to_string(), profile)),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable profile"),
            }
        }
        Ok(profiles)
    }
}

#[async_trait]
impl ProfileSource for ProfileService {
    async fn profiles(&self) -> Result<Vec<(String, Profile)>, ProfileError> {
        self.list_keyed_profiles().await
    }
}

fn ensure_subject(subject: &str) -> Result<(), ProfileError> {
    if subject.is_empty() {
        return Err(ProfileError::InvalidInput("subject must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityError;
    use crate::leaderboard::Leaderboard;
    use profilecache_storage::{InMemoryStore, KvStore};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider serving a fixed response and counting calls.
    struct FakeProvider {
        response: Result<Profile, IdentityError>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn returning(profile: Profile) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(profile),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(err: IdentityError) -> Arc<Self> {
            Arc::new(Self {
                response: Err(err),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn fetch_profile(&self, _subject: &str) -> Result<Profile, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    /// Store whose every operation fails.
    struct DownStore;

    #[async_trait]
    impl KvStore for DownStore {
        async fn get_hash(&self, _key: &str) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        async fn set_hash_fields(
            &self,
            _key: &str,
            _fields: &[(String, String)],
        ) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        async fn increment_hash_field(
            &self,
            _key: &str,
            _field: &str,
            _delta: i64,
        ) -> Result<i64, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        async fn list_keys_by_prefix(
            &self,
            _prefix: &str,
        ) -> Result<HashSet<String>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }

        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    fn abc() -> Profile {
        Profile::new("abc").with_nickname("x").with_score(5)
    }

    fn service(store: Arc<InMemoryStore>, provider: Arc<FakeProvider>) -> ProfileService {
        ProfileService::new(store, provider)
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn miss_populates_store_from_provider() {
        let store = Arc::new(InMemoryStore::new());
        let provider = FakeProvider::returning(abc());
        let svc = service(store.clone(), provider.clone());

        let profile = svc.get_profile("abc").await.unwrap();
        assert_eq!(profile, abc());
        assert_eq!(provider.calls(), 1);

        let stored = store.get_hash("user:abc").await.unwrap();
        assert_eq!(stored.get("score").map(String::as_str), Some("5"));
        assert_eq!(stored.get("nickname").map(String::as_str), Some("x"));
        assert_eq!(stored.get("sub").map(String::as_str), Some("abc"));
        assert_eq!(svc.read_cached("abc").await.unwrap(), abc());
    }

    #[tokio::test]
    async fn populated_profile_is_served_without_provider() {
        let store = Arc::new(InMemoryStore::new());
        let provider = FakeProvider::returning(abc());
        let svc = service(store, provider.clone());

        for _ in 0..5 {
            assert_eq!(svc.get_profile("abc").await.unwrap(), abc());
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_score_triggers_refetch() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_hash_fields("user:abc", &fields(&[("score", "lots"), ("nickname", "old")]))
            .await
            .unwrap();
        let provider = FakeProvider::returning(abc());
        let svc = service(store.clone(), provider.clone());

        assert!(matches!(
            svc.read_cached("abc").await,
            Err(CacheLookupError::Malformed(_))
        ));
        assert_eq!(svc.get_profile("abc").await.unwrap(), abc());
        assert_eq!(provider.calls(), 1);
        assert_eq!(svc.read_cached("abc").await.unwrap(), abc());
    }

    #[tokio::test]
    async fn record_without_score_triggers_refetch() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_hash_fields("user:abc", &fields(&[("nickname", "old")]))
            .await
            .unwrap();
        let provider = FakeProvider::returning(abc());
        let svc = service(store, provider.clone());

        assert_eq!(svc.get_profile("abc").await.unwrap(), abc());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_profile_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        let provider = FakeProvider::failing(IdentityError::NotFound {
            subject: "ghost".into(),
        });
        let svc = service(store.clone(), provider);

        let err = svc.get_profile("ghost").await.unwrap_err();
        assert_eq!(
            err,
            ProfileError::ProfileUnavailable {
                subject: "ghost".into()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_outage_on_read_skips_provider() {
        let provider = FakeProvider::returning(abc());
        let svc = ProfileService::new(Arc::new(DownStore), provider.clone());

        let err = svc.get_profile("abc").await.unwrap_err();
        assert!(matches!(err, ProfileError::StoreUnavailable(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn empty_subject_is_invalid_input() {
        let svc = service(Arc::new(InMemoryStore::new()), FakeProvider::returning(abc()));
        assert!(matches!(
            svc.get_profile("").await,
            Err(ProfileError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.increment_score("").await,
            Err(ProfileError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn increment_on_unseen_subject_creates_partial_record() {
        let provider = FakeProvider::returning(abc());
        let svc = service(Arc::new(InMemoryStore::new()), provider.clone());

        let update = svc.increment_score("new").await.unwrap();
        assert_eq!(update.new_score, 1);
        assert_eq!(update.profile, Profile::default().with_score(1));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn sequential_increments_count_up() {
        let svc = service(Arc::new(InMemoryStore::new()), FakeProvider::returning(abc()));
        for n in 1..=7 {
            let update = svc.increment_score("new").await.unwrap();
            assert_eq!(update.new_score, n);
            assert_eq!(update.profile.score, n);
        }
    }

    #[tokio::test]
    async fn increment_keeps_populated_fields() {
        let svc = service(Arc::new(InMemoryStore::new()), FakeProvider::returning(abc()));
        svc.get_profile("abc").await.unwrap();

        let update = svc.increment_score("abc").await.unwrap();
        assert_eq!(update.new_score, 6);
        assert_eq!(update.profile, abc().with_score(6));
    }

    #[tokio::test]
    async fn increment_store_outage_is_store_unavailable() {
        let svc = ProfileService::new(Arc::new(DownStore), FakeProvider::returning(abc()));
        assert!(matches!(
            svc.increment_score("abc").await,
            Err(ProfileError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn list_skips_unreadable_records() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_hash_fields("user:a", &fields(&[("sub", "a"), ("score", "3")]))
            .await
            .unwrap();
        store
            .set_hash_fields("user:b", &fields(&[("sub", "b"), ("score", "NaN")]))
            .await
            .unwrap();
        store
            .set_hash_fields("session:c", &fields(&[("score", "1")]))
            .await
            .unwrap();
        let svc = service(store, FakeProvider::returning(abc()));

        let profiles = svc.list_profiles().await.unwrap();
        assert_eq!(profiles, vec![Profile::new("a").with_score(3)]);
    }

    #[tokio::test]
    async fn list_enumeration_failure_is_an_error() {
        let svc = ProfileService::new(Arc::new(DownStore), FakeProvider::returning(abc()));
        assert!(matches!(
            svc.list_profiles().await,
            Err(ProfileError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn custom_schema_and_prefix_are_used() {
        let store = Arc::new(InMemoryStore::new());
        let schema = HashSchema {
            subject: "user_id".into(),
            image_url: "picture".into(),
            ..HashSchema::default()
        };
        let svc = service(store.clone(), FakeProvider::returning(abc()))
            .with_key_space(KeySpace::new("profile:"))
            .with_schema(schema);

        svc.get_profile("abc").await.unwrap();
        let stored = store.get_hash("profile:abc").await.unwrap();
        assert_eq!(stored.get("user_id").map(String::as_str), Some("abc"));
        assert!(stored.contains_key("picture"));
        assert!(!stored.contains_key("sub"));
    }

    #[tokio::test]
    async fn leaderboard_names_partial_records_by_key() {
        let provider = FakeProvider::returning(abc());
        let svc = service(Arc::new(InMemoryStore::new()), provider.clone());
        svc.increment_score("new").await.unwrap();

        let top = Leaderboard::new(Arc::new(svc.clone())).top().await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].subject, "new");
        assert_eq!(top[0].score, 1);

        // The listing keeps the stored fields as they are
        let listed = svc.list_profiles().await.unwrap();
        assert_eq!(listed, vec![Profile::default().with_score(1)]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn leaderboard_ties_from_store_assert_membership_only() {
        let store = Arc::new(InMemoryStore::new());
        let tied = ["t1", "t2", "t3", "t4", "t5"];
        for subject in tied {
            store
                .set_hash_fields(&format!("user:{subject}"), &fields(&[("sub", subject), ("score", "5")]))
                .await
                .unwrap();
        }
        store
            .set_hash_fields("user:top", &fields(&[("sub", "top"), ("score", "9")]))
            .await
            .unwrap();
        store
            .set_hash_fields("user:low", &fields(&[("sub", "low"), ("score", "1")]))
            .await
            .unwrap();
        let svc = service(store, FakeProvider::returning(abc()));
        let board = Leaderboard::new(Arc::new(svc)).with_limit(3);

        let top = board.top().await.unwrap();
        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(top[0].subject, "top");
        let rest: HashSet<&str> = top[1..].iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|s| tied.contains(s)));

        // A limit past the population returns everyone
        let all = board.top_scores(50).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(all[6].subject, "low");
        let tied_members: HashSet<&str> = all[1..6].iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(tied_members, tied.into_iter().collect());
    }
}
