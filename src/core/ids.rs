//! Identifier types for the chat client.
//!
//! Strongly-typed newtypes for the identifiers that cross module boundaries:
//! server-side thread ids, chat message ids and workspace slugs.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side conversation identifier scoping a workspace's history.
///
/// Minted client-side as a random `UUIDv4` and persisted per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    /// Create a new random (v4) identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ThreadId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ThreadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

// ===== Workspace slugs ======================================================

/// Errors returned when validating a [`WorkspaceSlug`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    /// Empty (or whitespace-only) slug.
    Empty,
    /// Exceeds the maximum accepted length.
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        got: usize,
    },
}

impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "workspace slug must not be empty"),
            Self::TooLong { max, got } => {
                write!(f, "workspace slug too long: got {got}, max {max}")
            }
        }
    }
}

impl std::error::Error for SlugError {}

/// Name of a backend workspace (bot configuration), e.g. `cesame`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceSlug(String);

impl WorkspaceSlug {
    /// Hard ceiling to keep storage keys and URLs sane.
    pub const MAX_LEN: usize = 128;

    /// Build a validated slug (trimmed, non-empty, bounded length).
    ///
    /// # Errors
    /// Returns `SlugError` if the input is empty or too long.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SlugError> {
        let s = raw.as_ref().trim();
        if s.is_empty() {
            return Err(SlugError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(SlugError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkspaceSlug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for WorkspaceSlug {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<WorkspaceSlug> for String {
    fn from(value: WorkspaceSlug) -> Self {
        value.0
    }
}

impl TryFrom<String> for WorkspaceSlug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ===== Message ids ==========================================================

/// Identifier of a chat message, unique within one message list.
///
/// Locally minted ids look like `user-<uuid>` / `assistant-<uuid>`; ids derived
/// from server history look like `user-<serverId>` / `assistant-<serverId>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Fresh id for a user turn.
    #[must_use]
    pub fn new_user() -> Self {
        Self::user(Uuid::new_v4())
    }

    /// Fresh id for an assistant turn.
    #[must_use]
    pub fn new_assistant() -> Self {
        Self::assistant(Uuid::new_v4())
    }

    /// User-turn id derived from an external suffix.
    #[must_use]
    pub fn user(suffix: impl fmt::Display) -> Self {
        Self(format!("user-{suffix}"))
    }

    /// Assistant-turn id derived from an external suffix.
    #[must_use]
    pub fn assistant(suffix: impl fmt::Display) -> Self {
        Self(format!("assistant-{suffix}"))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
