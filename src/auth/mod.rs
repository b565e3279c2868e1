//! Authentication collaborator.
//!
//! The chat core only needs a bearer token; how it was obtained is opaque.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::storage::StorageService;

/// Boxed future type for token lookups.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Authenticated account as returned by the login endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Account id.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Supplies the bearer token attached to authenticated requests.
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` when not logged in.
    fn bearer_token(&self) -> TokenFuture<'_>;
}

/// Reads the token saved at login from the persistence collaborator.
#[derive(Clone)]
pub struct StoredTokenProvider {
    storage: StorageService,
}

impl StoredTokenProvider {
    /// Build a provider over the given storage.
    #[must_use]
    pub const fn new(storage: StorageService) -> Self {
        Self { storage }
    }
}

impl TokenProvider for StoredTokenProvider {
    fn bearer_token(&self) -> TokenFuture<'_> {
        Box::pin(async move { self.storage.auth_token().await })
    }
}

/// Fixed token, handy for scripts and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> TokenFuture<'_> {
        let token = self.0.clone();
        Box::pin(async move { token })
    }
}
