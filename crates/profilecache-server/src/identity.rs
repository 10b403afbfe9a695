//! Identity provider client.
//!
//! Profiles missing from the store are fetched from the user directory of an
//! external identity provider (an Auth0-style management API). The request is
//! a single bearer-authenticated GET per subject; there is no retry, and the
//! only deadline is the HTTP layer's request timeout.

use async_trait::async_trait;
use profilecache_core::Profile;

use crate::config::IdentityProviderConfig;

/// Placeholder substituted with the percent-encoded subject.
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Errors returned by an [`IdentityProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The provider has no user with this subject (HTTP 404).
    #[error("subject not found at identity provider: {subject}")]
    NotFound { subject: String },

    /// The provider rejected our credentials (HTTP 401/403).
    #[error("identity provider rejected credentials: status {status}")]
    Auth { status: u16 },

    /// Transport failure, unexpected status or an unparsable body.
    #[error("identity provider unavailable: {message}")]
    Transient { message: String },
}

impl IdentityError {
    /// Label used for the `identity_fetches_total` outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            IdentityError::NotFound { .. } => "not_found",
            IdentityError::Auth { .. } => "auth",
            IdentityError::Transient { .. } => "transient",
        }
    }

    fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }
}

/// Source of authoritative profile data.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch the profile of `subject`.
    async fn fetch_profile(&self, subject: &str) -> Result<Profile, IdentityError>;
}

/// [`IdentityProvider`] talking HTTP(S) to a user directory.
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    profile_url: String,
    token: Option<String>,
}

impl HttpIdentityProvider {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn new(config: &IdentityProviderConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("profilecache/", env!("CARGO_PKG_VERSION")))
            .build()?;
        if config.token.as_deref().is_none_or(str::is_empty) {
            tracing::warn!("No identity provider token configured; requests are sent unauthenticated");
        }
        Ok(Self::with_client(
            http_client,
            config.profile_url.clone(),
            config.token.clone().filter(|t| !t.is_empty()),
        ))
    }

    pub fn with_client(
        http_client: reqwest::Client,
        profile_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            http_client,
            profile_url: profile_url.into(),
            token,
        }
    }

    /// Expands the URL template for `subject`.
    pub fn profile_url_for(&self, subject: &str) -> String {
        self.profile_url
            .replace(SUBJECT_PLACEHOLDER, &urlencoding::encode(subject))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn fetch_profile(&self, subject: &str) -> Result<Profile, IdentityError> {
        let url = self.profile_url_for(subject);

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(subject = %subject, error = %e, "Failed to reach identity provider");
            IdentityError::transient(e.to_string())
        })?;

        let status = response.status();
        match status.as_u16() {
            404 => {
                return Err(IdentityError::NotFound {
                    subject: subject.to_string(),
                });
            }
            401 | 403 => {
                tracing::warn!(status = status.as_u16(), "Identity provider rejected token");
                return Err(IdentityError::Auth {
                    status: status.as_u16(),
                });
            }
            _ if !status.is_success() => {
                tracing::warn!(subject = %subject, status = status.as_u16(), "Identity provider returned an error status");
                return Err(IdentityError::transient(format!("unexpected status {status}")));
            }
            _ => {}
        }

        let profile: Profile = response.json().await.map_err(|e| {
            tracing::warn!(subject = %subject, error = %e, "Failed to parse identity provider response");
            IdentityError::transient(format!("invalid profile document: {e}"))
        })?;

        tracing::debug!(subject = %subject, "Fetched profile from identity provider");
        Ok(profile)
    }
}
