//! Chat Stream Client.
//!
//! One `POST .../stream-chat` per send, decoded from `text/event-stream` into
//! [`StreamEvent`]s. The connection lives in a background task and is dropped
//! as soon as the caller cancels.

pub mod client;
pub mod event;
pub mod sse;

pub use client::{ChatStream, ChatStreamClient, StreamHandler, StreamMessage, StreamOutcome};
pub use event::{StreamDelta, StreamEvent, DONE_SENTINEL};
pub use sse::SseDecoder;
