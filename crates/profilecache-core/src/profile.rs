//! User profile and the projections derived from it.
//!
//! JSON keys follow the identity provider's user document (`user_id`,
//! `picture`, `nickname`, `name`), so a provider response deserializes
//! directly into a [`Profile`]. Attributes the provider omits become empty
//! strings and `score` starts at zero.

use serde::{Deserialize, Serialize};

/// A user's profile and score.
///
/// Empty strings stand for absent optional attributes. A record created by
/// incrementing the score of a subject that was never fetched has every field
/// except `score` empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "user_id", default)]
    pub subject: String,
    #[serde(rename = "picture", default)]
    pub image_url: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub score: i64,
}

impl Profile {
    /// Creates an empty profile for `subject` with a zero score.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }
}

/// A leaderboard row. Recomputed on every request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "sub")]
    pub subject: String,
    pub score: i64,
    pub nickname: String,
    #[serde(rename = "image")]
    pub image_url: String,
}

impl LeaderboardEntry {
    /// Projects `profile` onto the row of `subject`.
    ///
    /// `subject` is the one the record is keyed under; the profile's own
    /// `subject` is ignored since partial records leave it empty.
    pub fn for_subject(subject: impl Into<String>, profile: Profile) -> Self {
        Self {
            subject: subject.into(),
            score: profile.score,
            nickname: profile.nickname,
            image_url: profile.image_url,
        }
    }
}

/// Outcome of a score increment.
///
/// `new_score` comes from the store's atomic increment and is authoritative.
/// `profile` is a separate read taken afterwards; under concurrent increments
/// its `score` may already include later increments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    #[serde(rename = "newScore")]
    pub new_score: i64,
    #[serde(rename = "userData")]
    pub profile: Profile,
}
