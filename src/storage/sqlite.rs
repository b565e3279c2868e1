//! SQLite-backed key-value store.

use std::path::Path;
use std::sync::Arc;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::{KeyValueStore, StorageResult, StoreFuture};

/// Durable store: one `SQLite` table mapping keys to JSON text.
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteKeyValueStore {
    /// Table name for key-value entries.
    pub const DEFAULT_TABLE: &'static str = "kv_store";

    /// Open (or create) the database file and initialize the table.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::new(Arc::new(conn)).await
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(Arc::new(conn)).await
    }

    /// Initialize the store on an existing connection.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> StorageResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreFuture<'_, StorageResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let now_ms = chrono::Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, updated_at) VALUES (?1, ?2, ?3)
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                            updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![key, value, now_ms],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(&format!("DELETE FROM {table}"), [])?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = SqliteKeyValueStore::open_in_memory().await.unwrap();
        store.set("k", "one".to_string()).await.unwrap();
        store.set("k", "two".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = SqliteKeyValueStore::open_in_memory().await.unwrap();
        store.set("a", "1".to_string()).await.unwrap();
        store.set("b", "2".to_string()).await.unwrap();

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());

        store.clear().await.unwrap();
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let path = std::env::temp_dir().join(format!("cesame-kv-{}.db", uuid::Uuid::new_v4()));
        {
            let store = SqliteKeyValueStore::open(&path).await.unwrap();
            store
                .set("cesame_thread_id_cesame", "abc".to_string())
                .await
                .unwrap();
        }
        let reopened = SqliteKeyValueStore::open(&path).await.unwrap();
        assert_eq!(
            reopened
                .get("cesame_thread_id_cesame")
                .await
                .unwrap()
                .as_deref(),
            Some("abc")
        );
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
