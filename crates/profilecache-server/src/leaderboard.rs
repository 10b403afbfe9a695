//! Top-N ranking of profiles by score.

use std::sync::Arc;

use async_trait::async_trait;
use profilecache_core::{LeaderboardEntry, Profile};

use crate::profiles::ProfileError;

pub const DEFAULT_LIMIT: usize = 10;

/// Supplies the full profile population to rank.
///
/// Each profile is paired with the subject it is stored under, which is what
/// the leaderboard reports. The store-backed implementation scans every key;
/// an ordered index could implement this trait without changing
/// [`Leaderboard`].
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profiles(&self) -> Result<Vec<(String, Profile)>, ProfileError>;
}

#[derive(Clone)]
pub struct Leaderboard {
    source: Arc<dyn ProfileSource>,
    limit: usize,
}

impl Leaderboard {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            source,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The configured number of highest-scoring entries.
    pub async fn top(&self) -> Result<Vec<LeaderboardEntry>, ProfileError> {
        self.top_scores(self.limit).await
    }

    /// Up to `limit` entries, highest score first.
    pub async fn top_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, ProfileError> {
        let profiles = self.source.profiles().await?;
        tracing::debug!(population = profiles.len(), limit, "Ranking profiles");
        Ok(rank(profiles, limit))
    }
}

/// Projects `profiles` to entries, sorts by descending score and truncates.
///
/// The sort is stable: tied entries keep the order they arrived in.
pub fn rank(profiles: Vec<(String, Profile)>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = profiles
        .into_iter()
        .map(|(subject, profile)| LeaderboardEntry::for_subject(subject, profile))
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries.truncate(limit);
    entries
}
