pub mod error;
pub mod profile;
pub mod schema;

pub use error::{DecodeError, Result};
pub use profile::{LeaderboardEntry, Profile, ScoreUpdate};
pub use schema::{HashSchema, KeySpace};
