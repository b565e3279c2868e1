//! State shared by the demo backend's handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use crate::api::HistoryEntry;

/// Delay between streamed words when none is configured.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(80);

/// In-memory backend state.
pub struct DemoState {
    /// Completed exchanges, keyed by `<workspace>/<thread>`.
    histories: DashMap<String, Vec<HistoryEntry>>,
    next_id: AtomicU64,
    /// Pause before each streamed word.
    pub word_delay: Duration,
}

impl DemoState {
    /// Create the state with the given streaming pace.
    #[must_use]
    pub fn new(word_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            histories: DashMap::new(),
            next_id: AtomicU64::new(1),
            word_delay,
        })
    }

    /// Exchanges recorded for a thread, oldest first.
    #[must_use]
    pub fn history(&self, workspace: &str, thread: &str) -> Vec<HistoryEntry> {
        self.histories
            .get(&thread_key(workspace, thread))
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Record one finished exchange.
    pub fn record(&self, workspace: &str, thread: &str, prompt: String, response: String) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.histories
            .entry(thread_key(workspace, thread))
            .or_default()
            .push(HistoryEntry {
                id: id.to_string(),
                prompt,
                response,
                created_at: Some(Utc::now()),
            });
    }
}

fn thread_key(workspace: &str, thread: &str) -> String {
    format!("{workspace}/{thread}")
}
