//! Chat message model shared by the session, the reconciler and the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::MessageId;

/// One turn of a conversation.
///
/// Serialized as `{"id","type":"user","prompt","createdAt"}` or
/// `{"id","type":"assistant","response","createdAt","isStreaming"?}`, which is
/// also the shape of the cached history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatMessage {
    /// A prompt typed by the user.
    User {
        /// Message id.
        id: MessageId,
        /// Prompt text.
        prompt: String,
        /// Creation time.
        #[serde(rename = "createdAt")]
        created_at: DateTime<Utc>,
    },
    /// A response produced by the workspace's assistant.
    Assistant {
        /// Message id.
        id: MessageId,
        /// Response text.
        response: String,
        /// Creation time.
        #[serde(rename = "createdAt")]
        created_at: DateTime<Utc>,
        /// Set only on the transient in-progress bubble.
        #[serde(rename = "isStreaming", default, skip_serializing_if = "is_false")]
        is_streaming: bool,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl ChatMessage {
    /// New user turn stamped now.
    #[must_use]
    pub fn user(prompt: impl Into<String>) -> Self {
        Self::User {
            id: MessageId::new_user(),
            prompt: prompt.into(),
            created_at: Utc::now(),
        }
    }

    /// New, final assistant turn stamped now.
    #[must_use]
    pub fn assistant(response: impl Into<String>) -> Self {
        Self::Assistant {
            id: MessageId::new_assistant(),
            response: response.into(),
            created_at: Utc::now(),
            is_streaming: false,
        }
    }

    /// The transient bubble shown while a response is still streaming.
    #[must_use]
    pub fn streaming_preview(partial: impl Into<String>) -> Self {
        Self::Assistant {
            id: MessageId::from("streaming"),
            response: partial.into(),
            created_at: Utc::now(),
            is_streaming: true,
        }
    }

    /// Message id.
    #[must_use]
    pub const fn id(&self) -> &MessageId {
        match self {
            Self::User { id, .. } | Self::Assistant { id, .. } => id,
        }
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::User { created_at, .. } | Self::Assistant { created_at, .. } => *created_at,
        }
    }

    /// Prompt or response text, whichever this variant carries.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::User { prompt, .. } => prompt,
            Self::Assistant { response, .. } => response,
        }
    }

    /// Whether this is a user turn.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}
