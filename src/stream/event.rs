//! Typed events produced by a chat stream.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::errors::ChatError;

/// Payload the server sends as its last frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Message type tag carried by every delta.
pub const TEXT_RESPONSE_TYPE: &str = "textResponse";

/// One incremental piece of the assistant's answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDelta {
    /// Text fragment carried by this frame (may be empty for keep-alives).
    pub text_response: String,
    /// Concatenation of every fragment received so far, this one included.
    pub full_text: String,
    /// Server-reported error; the stream keeps going.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The server flagged the frame with `close: true`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub close: bool,
    /// Any other field of the frame, forwarded untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event yielded by a [`ChatStream`](super::ChatStream).
///
/// `Closed`, `Cancelled` and `Failed` are terminal: exactly one of them is
/// yielded, always last.
#[derive(Debug)]
pub enum StreamEvent {
    /// A frame was received.
    Delta(StreamDelta),
    /// The server finished; `full_text` is the whole answer.
    Closed {
        /// Concatenation of every delivered fragment, in arrival order.
        full_text: String,
    },
    /// The caller cancelled the stream; accumulated text must be discarded.
    Cancelled,
    /// The stream could not be opened or broke mid-way.
    Failed(ChatError),
}

impl StreamEvent {
    /// Whether no event can follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// What one event payload means for the stream.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    /// End-of-stream sentinel.
    Done,
    /// Text-bearing (or keep-alive) frame, already folded into the accumulator.
    Delta(StreamDelta),
}

/// Interpret one event payload and grow `accumulated` accordingly.
///
/// JSON objects contribute their `textResponse`; anything else (invalid
/// JSON, bare strings, numbers) is taken as literal text so malformed frames
/// never stall the answer.
pub(crate) fn interpret_payload(payload: &str, accumulated: &mut String) -> Frame {
    if payload.trim() == DONE_SENTINEL {
        return Frame::Done;
    }

    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(payload) else {
        debug!("non-JSON frame forwarded as text");
        accumulated.push_str(payload);
        return Frame::Delta(StreamDelta {
            text_response: payload.to_string(),
            full_text: accumulated.clone(),
            ..StreamDelta::default()
        });
    };

    let text_response = match fields.remove(TEXT_RESPONSE_TYPE) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let close = matches!(fields.remove("close"), Some(Value::Bool(true)));
    let error = match fields.remove("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(message)) => Some(message),
        Some(other) => Some(other.to_string()),
    };

    if let Some(message) = &error {
        warn!("stream error reported by server: {message}");
    }
    if close {
        debug!("server flagged close on a delta frame");
    }

    accumulated.push_str(&text_response);
    fields
        .entry("type")
        .or_insert_with(|| Value::String(TEXT_RESPONSE_TYPE.to_string()));

    Frame::Delta(StreamDelta {
        text_response,
        full_text: accumulated.clone(),
        error,
        close,
        extra: fields,
    })
}
