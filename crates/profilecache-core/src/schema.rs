//! Layout of profile records in the key-value store.
//!
//! Each subject owns one hash record under `{prefix}{subject}`. The field
//! names inside the hash are a deployment setting: older deployments stored
//! `user_id`/`picture` where current ones store `sub`/`image`. The schema is
//! chosen explicitly in configuration and never guessed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::profile::Profile;

/// Stored hash field names for each profile attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSchema {
    #[serde(default = "default_subject_field")]
    pub subject: String,
    #[serde(default = "default_image_field")]
    pub image_url: String,
    #[serde(default = "default_nickname_field")]
    pub nickname: String,
    #[serde(default = "default_display_name_field")]
    pub display_name: String,
    #[serde(default = "default_score_field")]
    pub score: String,
}

fn default_subject_field() -> String {
    "sub".into()
}
fn default_image_field() -> String {
    "image".into()
}
fn default_nickname_field() -> String {
    "nickname".into()
}
fn default_display_name_field() -> String {
    "name".into()
}
fn default_score_field() -> String {
    "score".into()
}

impl Default for HashSchema {
    fn default() -> Self {
        Self {
            subject: default_subject_field(),
            image_url: default_image_field(),
            nickname: default_nickname_field(),
            display_name: default_display_name_field(),
            score: default_score_field(),
        }
    }
}

impl HashSchema {
    fn names(&self) -> [&str; 5] {
        [
            &self.subject,
            &self.image_url,
            &self.nickname,
            &self.display_name,
            &self.score,
        ]
    }

    /// Field names must be non-empty and pairwise distinct.
    pub fn validate(&self) -> Result<(), String> {
        let names = self.names();
        if names.iter().any(|n| n.is_empty()) {
            return Err("hash field names must not be empty".into());
        }
        for (i, a) in names.iter().enumerate() {
            if names[i + 1..].contains(a) {
                return Err(format!("hash field name '{a}' is used more than once"));
            }
        }
        Ok(())
    }

    /// All attributes of `profile` as `(field, value)` pairs, score as decimal text.
    pub fn encode(&self, profile: &Profile) -> Vec<(String, String)> {
        vec![
            (self.subject.clone(), profile.subject.clone()),
            (self.image_url.clone(), profile.image_url.clone()),
            (self.nickname.clone(), profile.nickname.clone()),
            (self.display_name.clone(), profile.display_name.clone()),
            (self.score.clone(), profile.score.to_string()),
        ]
    }

    /// Rebuilds a profile from stored fields.
    ///
    /// Only the score is checked; any other missing field decodes as an empty
    /// string.
    pub fn decode(&self, fields: &HashMap<String, String>) -> Result<Profile, DecodeError> {
        let raw = fields
            .get(&self.score)
            .ok_or_else(|| DecodeError::missing_score(&self.score))?;
        let score = raw
            .parse::<i64>()
            .map_err(|_| DecodeError::invalid_score(&self.score, raw))?;

        let text = |name: &String| fields.get(name).cloned().unwrap_or_default();
        Ok(Profile {
            subject: text(&self.subject),
            image_url: text(&self.image_url),
            nickname: text(&self.nickname),
            display_name: text(&self.display_name),
            score,
        })
    }
}

/// Maps subjects to store keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("user:")
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn key_for(&self, subject: &str) -> String {
        format!("{}{subject}", self.prefix)
    }

    /// The subject a key belongs to, or `None` for keys outside this space.
    pub fn subject_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
    }
}
