//! Lazily resolves (and mints) the thread id of each workspace.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::core::ids::{ThreadId, WorkspaceSlug};
use crate::storage::StorageService;

/// Per-workspace thread identity, cached in memory and persisted in storage.
///
/// Clones share the same in-memory cache. Ids survive restarts through the
/// storage handle until [`ThreadResolver::reset`] is called.
#[derive(Clone)]
pub struct ThreadResolver {
    storage: StorageService,
    cache: Arc<DashMap<WorkspaceSlug, ThreadId>>,
}

impl ThreadResolver {
    /// Build a resolver over the given storage.
    #[must_use]
    pub fn new(storage: StorageService) -> Self {
        Self {
            storage,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Thread id of `workspace`, creating and persisting one if needed.
    ///
    /// A failed write is logged; the freshly minted id is still cached and
    /// returned so the conversation can proceed.
    pub async fn get_or_create(&self, workspace: &WorkspaceSlug) -> ThreadId {
        if let Some(id) = self.current(workspace) {
            return id;
        }

        if let Some(stored) = self.storage.thread_id(workspace).await {
            match stored.parse::<ThreadId>() {
                Ok(id) => {
                    debug!(%workspace, thread_id = %id, "resumed stored thread");
                    return self.adopt(workspace, id);
                }
                Err(err) => {
                    warn!(%workspace, "ignoring malformed stored thread id {stored:?}: {err}");
                }
            }
        }

        let id = ThreadId::new();
        self.storage
            .save_thread_id(workspace, &id.to_string())
            .await;
        info!(%workspace, thread_id = %id, "created new thread");
        self.adopt(workspace, id)
    }

    /// Forget the thread of `workspace`; the next resolution mints a new id.
    pub async fn reset(&self, workspace: &WorkspaceSlug) {
        self.cache.remove(workspace);
        self.storage.clear_thread_id(workspace).await;
        debug!(%workspace, "thread reset");
    }

    /// Cached id of `workspace`, without touching storage.
    #[must_use]
    pub fn current(&self, workspace: &WorkspaceSlug) -> Option<ThreadId> {
        self.cache.get(workspace).map(|entry| *entry.value())
    }

    /// Drop every cached id (persisted ids are kept).
    pub fn clear_all(&self) {
        self.cache.clear();
    }

    // Concurrent first resolutions race; the first cached id wins for everyone.
    fn adopt(&self, workspace: &WorkspaceSlug, id: ThreadId) -> ThreadId {
        *self.cache.entry(workspace.clone()).or_insert(id).value()
    }
}
