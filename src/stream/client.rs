//! SSE chat client: one request per send, consumed as a typed event sequence.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::event::{interpret_payload, Frame, StreamDelta, StreamEvent, DONE_SENTINEL};
use super::sse::SseDecoder;
use crate::auth::TokenProvider;
use crate::core::config::{endpoint, ClientConfig};
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::{ThreadId, WorkspaceSlug};
use crate::threads::ThreadResolver;

/// Buffered events between the connection task and the consumer.
const EVENT_BUFFER: usize = 128;

/// Request body of the stream-chat endpoint.
#[derive(Serialize)]
struct StreamChatRequest<'a> {
    message: &'a str,
    attachments: &'a [serde_json::Value],
}

/// Opens chat streams against the backend.
#[derive(Clone)]
pub struct ChatStreamClient {
    http: reqwest::Client,
    base_url: Url,
    open_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
    threads: ThreadResolver,
}

impl ChatStreamClient {
    /// Build a client from config.
    ///
    /// No total request timeout is installed: an open stream runs until the
    /// server finishes, fails, or the caller cancels.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the HTTP client cannot be built.
    pub fn new(
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        threads: ThreadResolver,
    ) -> ChatResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url()?,
            open_timeout: config.open_timeout,
            tokens,
            threads,
        })
    }

    /// Thread resolver used to address streams.
    #[must_use]
    pub const fn threads(&self) -> &ThreadResolver {
        &self.threads
    }

    /// `POST` target for a workspace thread.
    ///
    /// # Errors
    /// Returns an error if the base URL cannot take path segments.
    pub fn stream_url(&self, workspace: &WorkspaceSlug, thread: ThreadId) -> ChatResult<Url> {
        let thread = thread.to_string();
        endpoint(
            &self.base_url,
            &["workspace", workspace.as_str(), "thread", &thread, "stream-chat"],
        )
    }

    /// Send `message` to the workspace's thread and stream the answer.
    ///
    /// Resolves the thread id and bearer token, then hands the request to a
    /// background task that owns the connection. Firing `cancel` (or dropping
    /// the returned stream) tears the connection down. No reconnection is
    /// ever attempted.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn stream_chat(
        &self,
        workspace: &WorkspaceSlug,
        message: &str,
        cancel: CancellationToken,
    ) -> ChatStream {
        let cancel = cancel.child_token();
        let thread_id = self.threads.get_or_create(workspace).await;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        match self.build_request(workspace, thread_id, message).await {
            Ok(request) => {
                info!(%workspace, %thread_id, "starting chat stream");
                tokio::spawn(run_stream(request, self.open_timeout, tx, cancel.clone()));
            }
            Err(err) => {
                // Capacity is never exhausted by a single event.
                let _ = tx.try_send(StreamEvent::Failed(err));
            }
        }

        ChatStream {
            events: rx,
            cancel,
            thread_id,
            finished: false,
        }
    }

    async fn build_request(
        &self,
        workspace: &WorkspaceSlug,
        thread_id: ThreadId,
        message: &str,
    ) -> ChatResult<reqwest::RequestBuilder> {
        let url = self.stream_url(workspace, thread_id)?;
        let body = serde_json::to_vec(&StreamChatRequest {
            message,
            attachments: &[],
        })?;

        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .header(ACCEPT, "text/event-stream")
            .body(body);
        if let Some(token) = self.tokens.bearer_token().await {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        Ok(request)
    }
}

/// How the connection task stopped when it did not fail.
enum PumpEnd {
    /// Sentinel received: the full answer.
    Done(String),
    /// The consumer dropped its receiver.
    Detached,
}

async fn run_stream(
    request: reqwest::RequestBuilder,
    open_timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    // Losing the race drops `pump`, and the response with it.
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("chat stream cancelled, connection released");
            return;
        }
        result = pump(request, open_timeout, &tx) => result,
    };

    match result {
        Ok(PumpEnd::Done(full_text)) => {
            info!(chars = full_text.chars().count(), "chat stream completed");
            let _ = tx.send(StreamEvent::Closed { full_text }).await;
        }
        Ok(PumpEnd::Detached) => debug!("chat stream consumer went away"),
        Err(err) => {
            warn!("chat stream failed: {err}");
            let _ = tx.send(StreamEvent::Failed(err)).await;
        }
    }
}

async fn pump(
    request: reqwest::RequestBuilder,
    open_timeout: Duration,
    tx: &mpsc::Sender<StreamEvent>,
) -> ChatResult<PumpEnd> {
    let response = tokio::time::timeout(open_timeout, request.send())
        .await
        .map_err(|_| {
            ChatError::OpenTimeout(u64::try_from(open_timeout.as_millis()).unwrap_or(u64::MAX))
        })??;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            body
        };
        return Err(ChatError::OpenFailed {
            status: status.as_u16(),
            message,
        });
    }
    debug!("chat stream opened");

    let mut decoder = SseDecoder::new();
    let mut accumulated = String::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| ChatError::Transport(err.to_string()))?;
        for payload in decoder.feed(&chunk) {
            match interpret_payload(&payload, &mut accumulated) {
                Frame::Done => return Ok(PumpEnd::Done(accumulated)),
                Frame::Delta(delta) => {
                    if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                        return Ok(PumpEnd::Detached);
                    }
                }
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        match interpret_payload(&payload, &mut accumulated) {
            Frame::Done => return Ok(PumpEnd::Done(accumulated)),
            Frame::Delta(delta) => {
                if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                    return Ok(PumpEnd::Detached);
                }
            }
        }
    }

    // Only the sentinel completes an answer; a cut body is a broken stream.
    Err(ChatError::Transport(format!(
        "stream ended before {DONE_SENTINEL}"
    )))
}

// ===== Consumer side =========================================================

/// Message passed to [`StreamHandler::on_message`].
#[derive(Debug, Clone, Copy)]
pub enum StreamMessage<'a> {
    /// A received frame.
    Delta(&'a StreamDelta),
    /// The `{close: true}` marker, carrying the final text.
    Close {
        /// Whole answer.
        full_text: &'a str,
    },
}

/// Callback-style consumer for [`ChatStream::drive`].
pub trait StreamHandler {
    /// Called for every frame, then once with the close marker.
    fn on_message(&mut self, message: StreamMessage<'_>);

    /// Called exactly once if the stream fails.
    fn on_error(&mut self, _error: &ChatError) {}

    /// Called once after a normal close or a cancellation.
    fn on_close(&mut self) {}
}

/// How a driven stream settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server finished the answer.
    Completed {
        /// Whole answer.
        full_text: String,
    },
    /// The caller cancelled.
    Cancelled,
}

/// Receiving end of one chat stream.
///
/// Dropping it cancels the underlying connection.
#[derive(Debug)]
pub struct ChatStream {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    thread_id: ThreadId,
    finished: bool,
}

impl ChatStream {
    /// Thread the message was posted to.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Cancel this stream only (the caller's token is left untouched).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event, or `None` once a terminal event has been yielded.
    ///
    /// Once the token fires no further delta is yielded, even if some were
    /// already buffered: the next call returns [`StreamEvent::Cancelled`].
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            return Some(self.settle(StreamEvent::Cancelled));
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Some(self.settle(StreamEvent::Cancelled)),
            event = self.events.recv() => match event {
                Some(event) if event.is_terminal() => Some(self.settle(event)),
                Some(event) => Some(event),
                None => Some(self.settle(StreamEvent::Failed(ChatError::Transport(
                    "stream task ended without a terminal event".to_string(),
                )))),
            },
        }
    }

    /// Feed every event to `handler` and settle like a promise: `Ok` on close
    /// or cancellation, `Err` on failure.
    ///
    /// # Errors
    /// Returns the stream failure after `on_error` has seen it.
    pub async fn drive<H: StreamHandler + ?Sized>(
        mut self,
        handler: &mut H,
    ) -> ChatResult<StreamOutcome> {
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Delta(delta) => handler.on_message(StreamMessage::Delta(&delta)),
                StreamEvent::Closed { full_text } => {
                    handler.on_message(StreamMessage::Close {
                        full_text: &full_text,
                    });
                    handler.on_close();
                    return Ok(StreamOutcome::Completed { full_text });
                }
                StreamEvent::Cancelled => {
                    handler.on_close();
                    return Ok(StreamOutcome::Cancelled);
                }
                StreamEvent::Failed(err) => {
                    handler.on_error(&err);
                    return Err(err);
                }
            }
        }
        Err(ChatError::Transport("stream already settled".to_string()))
    }

    fn settle(&mut self, event: StreamEvent) -> StreamEvent {
        self.finished = true;
        self.events.close();
        event
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::Router;

    use super::*;
    use crate::auth::StaticToken;
    use crate::storage::{MemoryKeyValueStore, StorageService};
    use crate::test_support::{frame, spawn_backend, STREAM_ROUTE};

    fn client(base_url: &str, token: Option<&str>) -> ChatStreamClient {
        let storage = StorageService::new(Arc::new(MemoryKeyValueStore::new()));
        let config = ClientConfig::new()
            .with_base_url(base_url)
            .with_open_timeout(Duration::from_millis(500));
        ChatStreamClient::new(
            &config,
            Arc::new(StaticToken(token.map(str::to_string))),
            ThreadResolver::new(storage),
        )
        .unwrap()
    }

    fn slug() -> WorkspaceSlug {
        WorkspaceSlug::new("cesame").unwrap()
    }

    fn sse_response(body: String) -> Response {
        ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    /// Frames then a connection that never ends.
    fn hanging_response(frames: Vec<String>) -> Response {
        let chunks = futures::stream::iter(frames.into_iter().map(Ok::<_, std::io::Error>))
            .chain(futures::stream::pending());
        ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(chunks)).into_response()
    }

    async fn collect(mut stream: ChatStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_stream_url_encodes_segments() {
        let c = client("http://localhost:3000/api/", None);
        let thread = ThreadId::new();
        let url = c
            .stream_url(&WorkspaceSlug::new("my space").unwrap(), thread)
            .unwrap();
        assert_eq!(
            url.as_str(),
            format!("http://localhost:3000/api/workspace/my%20space/thread/{thread}/stream-chat")
        );
    }

    #[tokio::test]
    async fn test_deltas_then_close_concatenate() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                sse_response(format!(
                    "{}{}{}{}",
                    frame(r#"{"textResponse":"Bon"}"#),
                    frame(r#"{"textResponse":"jour"}"#),
                    frame(r#"{"textResponse":"!"}"#),
                    frame("[DONE]")
                ))
            }),
        );
        let base = spawn_backend(router).await;
        let c = client(&base, None);
        let stream = c
            .stream_chat(&slug(), "Bonjour", CancellationToken::new())
            .await;
        assert_eq!(Some(stream.thread_id()), c.threads().current(&slug()));

        let events = collect(stream).await;
        assert_eq!(events.len(), 4);
        let fulls: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Delta(d) => Some(d.full_text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fulls, vec!["Bon", "Bonjour", "Bonjour!"]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Closed { full_text }) if full_text == "Bonjour!"
        ));
    }

    #[tokio::test]
    async fn test_request_shape_and_bearer_header() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|headers: HeaderMap, body: String| async move {
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let accept = headers
                    .get(ACCEPT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
                let echo = serde_json::json!({
                    "textResponse": format!("{auth}|{accept}|{}|{}", parsed["message"], parsed["attachments"]),
                });
                sse_response(format!("{}{}", frame(&echo.to_string()), frame("[DONE]")))
            }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, Some("tok-123"))
                .stream_chat(&slug(), "Salut", CancellationToken::new())
                .await,
        )
        .await;

        assert!(matches!(
            events.last(),
            Some(StreamEvent::Closed { full_text })
                if full_text == "Bearer tok-123|text/event-stream|\"Salut\"|[]"
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_forwarded_as_text() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                sse_response(format!(
                    "{}{}{}",
                    frame(r#"{"textResponse":"Say "}"#),
                    frame("hello"),
                    frame("[DONE]")
                ))
            }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, None)
                .stream_chat(&slug(), "x", CancellationToken::new())
                .await,
        )
        .await;

        match &events[1] {
            StreamEvent::Delta(d) => {
                assert_eq!(d.text_response, "hello");
                assert_eq!(d.full_text, "Say hello");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Failed(_))));
    }

    #[tokio::test]
    async fn test_open_failure_reports_body() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async { (StatusCode::UNAUTHORIZED, "Invalid token") }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, None)
                .stream_chat(&slug(), "x", CancellationToken::new())
                .await,
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Failed(ChatError::OpenFailed { status, message }) => {
                assert_eq!(*status, 401);
                assert_eq!(message, "Invalid token");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_failure_without_body_uses_status() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, None)
                .stream_chat(&slug(), "x", CancellationToken::new())
                .await,
        )
        .await;

        assert!(matches!(
            &events[0],
            StreamEvent::Failed(ChatError::OpenFailed { status: 500, message }) if message == "HTTP 500"
        ));
    }

    #[tokio::test]
    async fn test_open_timeout() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                sse_response(frame("[DONE]"))
            }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, None)
                .stream_chat(&slug(), "x", CancellationToken::new())
                .await,
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Failed(ChatError::OpenTimeout(500))));
    }

    #[tokio::test]
    async fn test_cancel_before_any_frame() {
        let router = Router::new().route(STREAM_ROUTE, post(|| async { hanging_response(vec![]) }));
        let base = spawn_backend(router).await;
        let token = CancellationToken::new();
        let stream = client(&base, None)
            .stream_chat(&slug(), "x", token.clone())
            .await;

        token.cancel();
        let events = collect(stream).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_after_k_frames() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                hanging_response(vec![
                    frame(r#"{"textResponse":"a"}"#),
                    frame(r#"{"textResponse":"b"}"#),
                ])
            }),
        );
        let base = spawn_backend(router).await;
        let token = CancellationToken::new();
        let mut stream = client(&base, None)
            .stream_chat(&slug(), "x", token.clone())
            .await;

        let mut fulls = Vec::new();
        for _ in 0..2 {
            match stream.next().await {
                Some(StreamEvent::Delta(d)) => fulls.push(d.full_text),
                other => panic!("unexpected event {other:?}"),
            }
        }
        token.cancel();

        assert_eq!(fulls, vec!["a".to_string(), "ab".to_string()]);
        assert!(matches!(stream.next().await, Some(StreamEvent::Cancelled)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_buffered_deltas_hidden_after_cancel() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                hanging_response(vec![
                    frame(r#"{"textResponse":"a"}"#),
                    frame(r#"{"textResponse":"b"}"#),
                    frame(r#"{"textResponse":"c"}"#),
                ])
            }),
        );
        let base = spawn_backend(router).await;
        let mut stream = client(&base, None)
            .stream_chat(&slug(), "x", CancellationToken::new())
            .await;

        assert!(matches!(stream.next().await, Some(StreamEvent::Delta(_))));
        // Let the remaining frames land in the channel before cancelling.
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.cancel();
        assert!(matches!(stream.next().await, Some(StreamEvent::Cancelled)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_body_end_without_sentinel_fails() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async { sse_response(format!("{}data: tail", frame(r#"{"textResponse":"x"}"#))) }),
        );
        let base = spawn_backend(router).await;
        let events = collect(
            client(&base, None)
                .stream_chat(&slug(), "x", CancellationToken::new())
                .await,
        )
        .await;

        assert_eq!(events.len(), 3);
        // The trailing unterminated event is still delivered.
        assert!(matches!(
            &events[1],
            StreamEvent::Delta(d) if d.full_text == "xtail"
        ));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Failed(ChatError::Transport(message))) if message.contains("[DONE]")
        ));
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Closed { .. })));
    }

    #[derive(Default)]
    struct Recorder {
        messages: Vec<String>,
        errors: usize,
        closes: usize,
    }

    impl StreamHandler for Recorder {
        fn on_message(&mut self, message: StreamMessage<'_>) {
            match message {
                StreamMessage::Delta(d) => self.messages.push(d.full_text.clone()),
                StreamMessage::Close { .. } => self.messages.push("<close>".to_string()),
            }
        }

        fn on_error(&mut self, _error: &ChatError) {
            self.errors += 1;
        }

        fn on_close(&mut self) {
            self.closes += 1;
        }
    }

    #[tokio::test]
    async fn test_drive_callbacks_on_close() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async {
                sse_response(format!("{}{}", frame(r#"{"textResponse":"ok"}"#), frame("[DONE]")))
            }),
        );
        let base = spawn_backend(router).await;
        let mut recorder = Recorder::default();
        let outcome = client(&base, None)
            .stream_chat(&slug(), "x", CancellationToken::new())
            .await
            .drive(&mut recorder)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                full_text: "ok".to_string()
            }
        );
        assert_eq!(recorder.messages, vec!["ok".to_string(), "<close>".to_string()]);
        assert_eq!(recorder.closes, 1);
        assert_eq!(recorder.errors, 0);
    }

    #[tokio::test]
    async fn test_drive_callbacks_on_failure() {
        let router = Router::new().route(
            STREAM_ROUTE,
            post(|| async { (StatusCode::FORBIDDEN, "nope") }),
        );
        let base = spawn_backend(router).await;
        let mut recorder = Recorder::default();
        let result = client(&base, None)
            .stream_chat(&slug(), "x", CancellationToken::new())
            .await
            .drive(&mut recorder)
            .await;

        assert!(result.is_err());
        assert_eq!(recorder.errors, 1);
        assert_eq!(recorder.closes, 0);
        assert!(recorder.messages.is_empty());
    }
}
