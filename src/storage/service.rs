//! Typed access to the persistence collaborator.
//!
//! Every typed helper is fire-and-forget: failures are logged and reported as
//! `false` / `None`, never as errors, so a broken cache cannot interrupt a chat.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::keys;
use super::{KeyValueStore, StorageResult};
use crate::auth::AuthUser;
use crate::core::ids::WorkspaceSlug;
use crate::core::message::ChatMessage;

/// Shared handle over a [`KeyValueStore`].
#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn KeyValueStore>,
}

impl StorageService {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store a raw string value.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    pub async fn set_raw(&self, key: &str, value: &str) -> StorageResult<()> {
        self.store.set(key, value.to_string()).await
    }

    /// Read a raw string value.
    ///
    /// # Errors
    /// Returns an error if the backend read fails.
    pub async fn get_raw(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.store.get(key).await?.filter(|v| !v.is_empty()))
    }

    /// Store a JSON-encoded value.
    ///
    /// # Errors
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.store.set(key, encoded).await
    }

    /// Read and decode a JSON value.
    ///
    /// # Errors
    /// Returns an error if the backend read or decoding fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete a value.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.store.remove(key).await
    }

    /// Delete every stored value.
    pub async fn clear(&self) -> bool {
        log_failure("*", "clear", self.store.clear().await)
    }

    // ===== Auth ==============================================================

    /// Persist the bearer token and the login time.
    pub async fn save_auth_token(&self, token: &str) -> bool {
        let saved = log_failure(keys::AUTH_TOKEN, "save", self.set_raw(keys::AUTH_TOKEN, token).await);
        let now = chrono::Utc::now().to_rfc3339();
        log_failure(
            keys::AUTH_TIMESTAMP,
            "save",
            self.set_raw(keys::AUTH_TIMESTAMP, &now).await,
        );
        saved
    }

    /// Stored bearer token, if any.
    pub async fn auth_token(&self) -> Option<String> {
        log_read(keys::AUTH_TOKEN, self.get_raw(keys::AUTH_TOKEN).await)
    }

    /// Persist the authenticated user.
    pub async fn save_auth_user(&self, user: &AuthUser) -> bool {
        log_failure(keys::AUTH_USER, "save", self.set_json(keys::AUTH_USER, user).await)
    }

    /// Stored authenticated user, if any.
    pub async fn auth_user(&self) -> Option<AuthUser> {
        log_read(keys::AUTH_USER, self.get_json(keys::AUTH_USER).await)
    }

    /// Forget every auth-related key.
    pub async fn clear_auth(&self) {
        for key in [keys::AUTH_TOKEN, keys::AUTH_USER, keys::AUTH_TIMESTAMP] {
            log_failure(key, "remove", self.remove(key).await);
        }
    }

    // ===== Chat history cache ================================================

    /// Overwrite the cached history of a workspace.
    pub async fn save_chat_history(&self, workspace: &WorkspaceSlug, history: &[ChatMessage]) -> bool {
        let key = keys::chat_history(workspace);
        log_failure(&key, "save", self.set_json(&key, history).await)
    }

    /// Cached history of a workspace; an undecodable cache counts as absent.
    pub async fn chat_history(&self, workspace: &WorkspaceSlug) -> Option<Vec<ChatMessage>> {
        let key = keys::chat_history(workspace);
        log_read(&key, self.get_json(&key).await)
    }

    /// Drop the cached history of a workspace.
    pub async fn clear_chat_history(&self, workspace: &WorkspaceSlug) -> bool {
        let key = keys::chat_history(workspace);
        log_failure(&key, "remove", self.remove(&key).await)
    }

    // ===== Thread ids ========================================================

    /// Persist the thread id of a workspace.
    pub async fn save_thread_id(&self, workspace: &WorkspaceSlug, thread_id: &str) -> bool {
        let key = keys::thread_id(workspace);
        log_failure(&key, "save", self.set_raw(&key, thread_id).await)
    }

    /// Persisted thread id of a workspace.
    pub async fn thread_id(&self, workspace: &WorkspaceSlug) -> Option<String> {
        let key = keys::thread_id(workspace);
        log_read(&key, self.get_raw(&key).await)
    }

    /// Forget the thread id of a workspace.
    pub async fn clear_thread_id(&self, workspace: &WorkspaceSlug) -> bool {
        let key = keys::thread_id(workspace);
        log_failure(&key, "remove", self.remove(&key).await)
    }

    // ===== Preferences =======================================================

    /// Remember the last opened workspace.
    pub async fn save_selected_workspace(&self, workspace: &WorkspaceSlug) -> bool {
        log_failure(
            keys::SELECTED_WORKSPACE,
            "save",
            self.set_raw(keys::SELECTED_WORKSPACE, workspace.as_str()).await,
        )
    }

    /// Last opened workspace, if it is still a valid slug.
    pub async fn selected_workspace(&self) -> Option<WorkspaceSlug> {
        log_read(
            keys::SELECTED_WORKSPACE,
            self.get_raw(keys::SELECTED_WORKSPACE).await,
        )
        .and_then(|raw| WorkspaceSlug::new(raw).ok())
    }

    /// Persist the completed-exchange counter.
    pub async fn save_message_count(&self, count: u64) -> bool {
        log_failure(
            keys::MESSAGE_COUNT,
            "save",
            self.set_json(keys::MESSAGE_COUNT, &count).await,
        )
    }

    /// Completed-exchange counter (zero when unset).
    pub async fn message_count(&self) -> u64 {
        log_read(keys::MESSAGE_COUNT, self.get_json(keys::MESSAGE_COUNT).await).unwrap_or(0)
    }
}

fn log_failure(key: &str, op: &str, result: StorageResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(key, op, "storage write failed: {err}");
            false
        }
    }
}

fn log_read<T>(key: &str, result: StorageResult<Option<T>>) -> Option<T> {
    result.unwrap_or_else(|err| {
        warn!(key, "storage read failed: {err}");
        None
    })
}
