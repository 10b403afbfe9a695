use thiserror::Error;

/// Errors raised while turning a stored hash record back into a [`Profile`].
///
/// [`Profile`]: crate::Profile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("score field '{field}' not found")]
    MissingScore { field: String },

    #[error("score field '{field}' is not an integer: {value:?}")]
    InvalidScore { field: String, value: String },
}

impl DecodeError {
    /// Create a new MissingScore error
    pub fn missing_score(field: impl Into<String>) -> Self {
        Self::MissingScore {
            field: field.into(),
        }
    }

    /// Create a new InvalidScore error
    pub fn invalid_score(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidScore {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result type alias for record decoding
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::missing_score("score");
        assert_eq!(err.to_string(), "score field 'score' not found");

        let err = DecodeError::invalid_score("score", "abc");
        assert_eq!(
            err.to_string(),
            "score field 'score' is not an integer: \"abc\""
        );
    }
}
