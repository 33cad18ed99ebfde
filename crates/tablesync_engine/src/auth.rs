//! Access token acquisition.

use crate::error::{SyncError, SyncResult};
use crate::transport::AccessToken;
use async_trait::async_trait;

/// Supplies access tokens for authenticated requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns a currently valid token, refreshing it if needed.
    ///
    /// Fails with [`SyncError::Authentication`] when there is no session.
    async fn access_token(&self) -> SyncResult<AccessToken>;
}

/// Always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    /// Creates a provider for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn access_token(&self) -> SyncResult<AccessToken> {
        Ok(self.token.clone())
    }
}

/// A provider with no signed-in session.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

#[async_trait]
impl AuthProvider for NoSession {
    async fn access_token(&self) -> SyncResult<AccessToken> {
        Err(SyncError::authentication("no current session"))
    }
}
