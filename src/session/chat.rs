//! Session orchestrator.
//!
//! Wires the thread resolver, the stream client and the history reconciler
//! together for one workspace. At most one send is in flight at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::auth::StoredTokenProvider;
use crate::core::config::ClientConfig;
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::WorkspaceSlug;
use crate::core::message::ChatMessage;
use crate::history::HistoryReconciler;
use crate::storage::StorageService;
use crate::stream::{ChatStreamClient, StreamDelta, StreamEvent};
use crate::threads::ThreadResolver;

/// How a send ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The answer arrived in full and was persisted.
    Completed(ChatMessage),
    /// The user stopped generation; the partial answer was dropped.
    Stopped,
}

#[derive(Default)]
struct SessionState {
    messages: Vec<ChatMessage>,
    preview: Option<String>,
    active: Option<CancellationToken>,
}

type SharedState = Arc<Mutex<SessionState>>;

// Never held across an await.
fn lock(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops the in-flight send of a [`ChatSession`] from anywhere.
#[derive(Clone)]
pub struct CancelHandle {
    state: SharedState,
}

impl CancelHandle {
    /// Cancel the active stream. Returns `false` when nothing was streaming.
    pub fn stop(&self) -> bool {
        let guard = lock(&self.state);
        match &guard.active {
            Some(token) => {
                token.cancel();
                info!("generation stopped");
                true
            }
            None => false,
        }
    }
}

/// One workspace's conversation as the chat screen sees it.
pub struct ChatSession {
    workspace: WorkspaceSlug,
    stream: ChatStreamClient,
    api: ApiClient,
    history: HistoryReconciler,
    storage: StorageService,
    state: SharedState,
}

impl ChatSession {
    /// Assemble a session from already-built collaborators.
    ///
    /// `stream` and `api` should share one [`ThreadResolver`].
    #[must_use]
    pub fn new(
        workspace: WorkspaceSlug,
        stream: ChatStreamClient,
        api: ApiClient,
        storage: StorageService,
    ) -> Self {
        Self {
            workspace,
            stream,
            api,
            history: HistoryReconciler::new(storage.clone()),
            storage,
            state: Arc::default(),
        }
    }

    /// Build every collaborator from config over `storage`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn from_config(
        config: &ClientConfig,
        storage: StorageService,
        workspace: WorkspaceSlug,
    ) -> ChatResult<Self> {
        let threads = ThreadResolver::new(storage.clone());
        let tokens = Arc::new(StoredTokenProvider::new(storage.clone()));
        let stream = ChatStreamClient::new(config, tokens, threads.clone())?;
        let api = ApiClient::new(config, storage.clone(), threads)?;
        Ok(Self::new(workspace, stream, api, storage))
    }

    /// Workspace this session talks to.
    #[must_use]
    pub const fn workspace(&self) -> &WorkspaceSlug {
        &self.workspace
    }

    /// REST client shared with this session.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Committed messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.clone()
    }

    /// Committed messages plus the in-progress bubble, if any.
    #[must_use]
    pub fn display_messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.messages();
        messages.extend(self.streaming_preview());
        messages
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    /// The in-progress assistant bubble, once some text has arrived.
    #[must_use]
    pub fn streaming_preview(&self) -> Option<ChatMessage> {
        lock(&self.state)
            .preview
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(ChatMessage::streaming_preview)
    }

    /// Handle for a stop button.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Show the cached list, then replace it with the server's history.
    ///
    /// A failing server leaves the cached list on screen. A send that starts
    /// while the history is loading wins: its list is left untouched and
    /// nothing is written. Returns what is displayed afterwards.
    ///
    /// # Errors
    /// Returns [`ChatError::StreamInProgress`] while a send is in flight.
    pub async fn load_history(&self) -> ChatResult<Vec<ChatMessage>> {
        if self.is_streaming() {
            return Err(ChatError::StreamInProgress);
        }

        if let Some(cached) = self.history.load_cached(&self.workspace).await {
            if self.replace_if_idle(&cached) {
                debug!(workspace = %self.workspace, count = cached.len(), "showing cached history");
            }
        }

        match self.api.try_chat_history(&self.workspace).await {
            Ok(entries) => {
                let messages = HistoryReconciler::from_server_history(&entries);
                if !self.replace_if_idle(&messages) {
                    debug!(workspace = %self.workspace, "send started, server history discarded");
                    return Ok(self.messages());
                }
                self.history.persist(&self.workspace, &messages).await;
                Ok(messages)
            }
            Err(err) => {
                warn!(workspace = %self.workspace, "server history unavailable, keeping cache: {err}");
                Ok(self.messages())
            }
        }
    }

    // Checked under the same lock `send` takes to mark itself active.
    fn replace_if_idle(&self, messages: &[ChatMessage]) -> bool {
        let mut state = lock(&self.state);
        if state.active.is_some() {
            return false;
        }
        state.messages = messages.to_vec();
        true
    }

    /// Send `text` and stream the answer, calling `on_delta` for every frame.
    ///
    /// The user message is shown immediately. On completion the exchange is
    /// persisted; on stop or failure only the user message remains and
    /// nothing is written.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidInput`] for blank text,
    /// [`ChatError::StreamInProgress`] if a send is already in flight, or the
    /// stream's failure.
    pub async fn send<F>(&self, text: &str, mut on_delta: F) -> ChatResult<ExchangeOutcome>
    where
        F: FnMut(&StreamDelta),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }

        let cancel = CancellationToken::new();
        let user = ChatMessage::user(text);
        let prior = {
            let mut state = lock(&self.state);
            if state.active.is_some() {
                return Err(ChatError::StreamInProgress);
            }
            state.active = Some(cancel.clone());
            state.preview = Some(String::new());
            let prior = state.messages.clone();
            state.messages.push(user.clone());
            prior
        };
        let _active = ActiveSend {
            state: &self.state,
            cancel: cancel.clone(),
        };

        let mut stream = self.stream.stream_chat(&self.workspace, text, cancel).await;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Delta(delta) => {
                    lock(&self.state).preview = Some(delta.full_text.clone());
                    on_delta(&delta);
                }
                StreamEvent::Closed { full_text } => {
                    return Ok(self.complete(&prior, user, full_text).await);
                }
                StreamEvent::Cancelled => {
                    debug!(workspace = %self.workspace, "exchange stopped, partial answer dropped");
                    return Ok(ExchangeOutcome::Stopped);
                }
                StreamEvent::Failed(err) => {
                    warn!(workspace = %self.workspace, "exchange failed: {err}");
                    return Err(err);
                }
            }
        }
        Err(ChatError::Transport("stream ended without a terminal event".to_string()))
    }

    /// Stop any send, forget the thread and clear the list and its cache.
    pub async fn new_conversation(&self) {
        self.cancel_handle().stop();
        self.stream.threads().reset(&self.workspace).await;
        lock(&self.state).messages.clear();
        self.storage.clear_chat_history(&self.workspace).await;
        info!(workspace = %self.workspace, "new conversation");
    }

    async fn complete(
        &self,
        prior: &[ChatMessage],
        user: ChatMessage,
        full_text: String,
    ) -> ExchangeOutcome {
        let messages = HistoryReconciler::finalize_exchange(prior, user, full_text);
        let assistant = messages.last().cloned();
        lock(&self.state).messages.clone_from(&messages);

        self.history.persist(&self.workspace, &messages).await;
        let count = self.storage.message_count().await.saturating_add(1);
        self.storage.save_message_count(count).await;
        info!(workspace = %self.workspace, count, "exchange completed");

        match assistant {
            Some(message) => ExchangeOutcome::Completed(message),
            None => ExchangeOutcome::Stopped,
        }
    }
}

/// Clears the in-flight marker however `send` exits, including when its
/// future is dropped.
struct ActiveSend<'a> {
    state: &'a SharedState,
    cancel: CancellationToken,
}

impl Drop for ActiveSend<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let mut state = lock(self.state);
        state.active = None;
        state.preview = None;
    }
}
