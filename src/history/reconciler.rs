//! Folding stream results and server history into the cached message list.

use chrono::Utc;
use tracing::{debug, info};

use crate::api::HistoryEntry;
use crate::core::ids::{MessageId, WorkspaceSlug};
use crate::core::message::ChatMessage;
use crate::storage::StorageService;

/// Builds and persists the per-workspace message list.
#[derive(Clone)]
pub struct HistoryReconciler {
    storage: StorageService,
}

impl HistoryReconciler {
    /// Build a reconciler over the given storage.
    #[must_use]
    pub const fn new(storage: StorageService) -> Self {
        Self { storage }
    }

    /// `prior` followed by `user` and a fresh assistant turn holding
    /// `accumulated_text`. Prior entries are left untouched.
    #[must_use]
    pub fn finalize_exchange(
        prior: &[ChatMessage],
        user: ChatMessage,
        accumulated_text: impl Into<String>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.extend_from_slice(prior);
        messages.push(user);
        messages.push(ChatMessage::assistant(accumulated_text));
        messages
    }

    /// Overwrite the cached list of `workspace`. Failures are logged.
    pub async fn persist(&self, workspace: &WorkspaceSlug, messages: &[ChatMessage]) -> bool {
        let saved = self.storage.save_chat_history(workspace, messages).await;
        if saved {
            debug!(%workspace, count = messages.len(), "history cached");
        }
        saved
    }

    /// Cached list of `workspace`, for an optimistic first render.
    pub async fn load_cached(&self, workspace: &WorkspaceSlug) -> Option<Vec<ChatMessage>> {
        self.storage.chat_history(workspace).await
    }

    /// Expand server entries into user/assistant pairs, keeping server order.
    ///
    /// Ids are derived from the server id (`user-<id>`, `assistant-<id>`); an
    /// entry without a timestamp is stamped now.
    #[must_use]
    pub fn from_server_history(entries: &[HistoryEntry]) -> Vec<ChatMessage> {
        let now = Utc::now();
        entries
            .iter()
            .flat_map(|entry| {
                let created_at = entry.created_at.unwrap_or(now);
                [
                    ChatMessage::User {
                        id: MessageId::user(&entry.id),
                        prompt: entry.prompt.clone(),
                        created_at,
                    },
                    ChatMessage::Assistant {
                        id: MessageId::assistant(&entry.id),
                        response: entry.response.clone(),
                        created_at,
                        is_streaming: false,
                    },
                ]
            })
            .collect()
    }

    /// Convert server history, overwrite the cache with it and return it.
    pub async fn load_authoritative(
        &self,
        workspace: &WorkspaceSlug,
        entries: &[HistoryEntry],
    ) -> Vec<ChatMessage> {
        let messages = Self::from_server_history(entries);
        self.persist(workspace, &messages).await;
        info!(%workspace, exchanges = entries.len(), "server history loaded");
        messages
    }
}
