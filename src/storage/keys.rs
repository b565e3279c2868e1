//! Storage key layout.

use crate::core::ids::WorkspaceSlug;

/// Bearer token issued at login.
pub const AUTH_TOKEN: &str = "cesame_auth_token";
/// Serialized authenticated user.
pub const AUTH_USER: &str = "cesame_auth_user";
/// Login time.
pub const AUTH_TIMESTAMP: &str = "cesame_auth_timestamp";
/// Last workspace opened.
pub const SELECTED_WORKSPACE: &str = "cesame_selected_workspace";
/// Number of completed exchanges.
pub const MESSAGE_COUNT: &str = "cesame_message_count";

const CHAT_HISTORY_PREFIX: &str = "cesame_chat_history_";
const THREAD_ID_PREFIX: &str = "cesame_thread_id_";

/// Cached message list of a workspace.
#[must_use]
pub fn chat_history(workspace: &WorkspaceSlug) -> String {
    format!("{CHAT_HISTORY_PREFIX}{workspace}")
}

/// Persisted thread id of a workspace.
#[must_use]
pub fn thread_id(workspace: &WorkspaceSlug) -> String {
    format!("{THREAD_ID_PREFIX}{workspace}")
}
