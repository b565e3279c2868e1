//! In-process backends for tests.

use axum::Router;
use tokio::net::TcpListener;

use crate::storage::{KeyValueStore, StorageError, StorageResult, StoreFuture};

/// Stream-chat route as mounted under the API base.
pub const STREAM_ROUTE: &str = "/api/workspace/{slug}/thread/{thread}/stream-chat";

/// Serve `router` on an ephemeral port; returns the API base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api")
}

/// One SSE event carrying `payload`.
pub fn frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Store whose every operation fails.
pub struct BrokenStore;

fn unavailable() -> StorageError {
    StorageError::Unavailable("disk gone".to_string())
}

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> StoreFuture<'_, StorageResult<Option<String>>> {
        Box::pin(async { Err(unavailable()) })
    }

    fn set(&self, _key: &str, _value: String) -> StoreFuture<'_, StorageResult<()>> {
        Box::pin(async { Err(unavailable()) })
    }

    fn remove(&self, _key: &str) -> StoreFuture<'_, StorageResult<()>> {
        Box::pin(async { Err(unavailable()) })
    }

    fn clear(&self) -> StoreFuture<'_, StorageResult<()>> {
        Box::pin(async { Err(unavailable()) })
    }
}
