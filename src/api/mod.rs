//! REST side of the backend: auth, workspaces, history and thread management.

pub mod client;
pub mod types;

pub use client::ApiClient;
pub use types::{HistoryEntry, LoginRequest, LoginResponse, RemoteThread, Workspace};
