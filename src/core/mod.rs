//! Core chat types: configuration, errors, identifiers and messages.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;

pub use config::ClientConfig;
pub use errors::{ChatError, ChatResult};
pub use ids::{MessageId, SlugError, ThreadId, WorkspaceSlug};
pub use message::ChatMessage;
