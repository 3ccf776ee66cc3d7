use async_trait::async_trait;

use crate::error::BackendError;

/// Source of the signed-in user and their bearer credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable id of the signed-in user, `None` when signed out.
    fn user_id(&self) -> Option<String>;

    /// A fresh bearer token, `None` when signed out.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the provider fails to mint a token.
    async fn bearer_token(&self) -> Result<Option<String>, BackendError>;
}

/// Identity with a pre-issued token, e.g. read from the environment.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
    token: Option<String>,
}

impl StaticIdentity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Reads `ZENITH_USER_ID` and `ZENITH_ID_TOKEN`; blank values count as unset.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        Self {
            user_id: read("ZENITH_USER_ID"),
            token: read("ZENITH_ID_TOKEN"),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    async fn bearer_token(&self) -> Result<Option<String>, BackendError> {
        Ok(self.token.clone())
    }
}

/// Resolve a token or short-circuit before any network call.
pub(crate) async fn require_token(identity: &dyn IdentityProvider) -> Result<String, BackendError> {
    identity
        .bearer_token()
        .await?
        .ok_or(BackendError::Unauthenticated)
}
