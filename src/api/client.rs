//! Authenticated JSON client for the backend's REST routes.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::types::{
    HistoryEntry, LoginRequest, LoginResponse, RemoteThread, RenameRequest, ThreadChats,
    ThreadEnvelope, ThreadList, Workspace,
};
use crate::core::config::{endpoint, ClientConfig};
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::WorkspaceSlug;
use crate::storage::StorageService;
use crate::threads::ThreadResolver;

/// REST client sharing storage and thread identity with the chat stream.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    storage: StorageService,
    threads: ThreadResolver,
}

impl ApiClient {
    /// Build a client from config.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the HTTP client cannot be built.
    pub fn new(
        config: &ClientConfig,
        storage: StorageService,
        threads: ThreadResolver,
    ) -> ChatResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url()?,
            storage,
            threads,
        })
    }

    /// Send an authenticated request and decode the JSON answer.
    ///
    /// An empty body decodes as `null`; a non-JSON body as a JSON string.
    ///
    /// # Errors
    /// Returns [`ChatError::Api`] on a non-success status, with the body's
    /// `message` or `error` field (or `HTTP <status>`) as message.
    pub async fn request<T, B>(&self, method: Method, path: &[&str], body: Option<&B>) -> ChatResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = endpoint(&self.base_url, path)?;
        debug!(%method, %url, "api request");

        let mut request = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.storage.auth_token().await {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if !status.is_success() {
            let message = ["message", "error"]
                .iter()
                .find_map(|field| data.get(field).and_then(Value::as_str))
                .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string);
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_value(data)?)
    }

    /// Log in and persist the returned token and user.
    ///
    /// # Errors
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn login(&self, username: &str, password: &str) -> ChatResult<LoginResponse> {
        info!(username, "login request");
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self
            .request(Method::POST, &["auth", "login"], Some(&body))
            .await?;

        if let Some(token) = &response.token {
            self.storage.save_auth_token(token).await;
        }
        if let Some(user) = &response.user {
            self.storage.save_auth_user(user).await;
        }
        info!("login successful");
        Ok(response)
    }

    /// Log out remotely (best effort), then forget local credentials and the
    /// in-memory thread ids.
    pub async fn logout(&self) {
        if let Err(err) = self
            .request::<Value, ()>(Method::POST, &["auth", "logout"], None)
            .await
        {
            warn!("logout endpoint failed, clearing local data anyway: {err}");
        }
        self.storage.clear_auth().await;
        self.threads.clear_all();
        info!("logged out");
    }

    /// Workspaces visible to the current user.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn workspaces(&self) -> ChatResult<Vec<Workspace>> {
        let workspaces: Vec<Workspace> = self
            .request::<_, ()>(Method::GET, &["workspaces"], None)
            .await?;
        debug!(count = workspaces.len(), "workspaces fetched");
        Ok(workspaces)
    }

    /// History of the workspace's current thread.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn try_chat_history(&self, workspace: &WorkspaceSlug) -> ChatResult<Vec<HistoryEntry>> {
        let thread = self.threads.get_or_create(workspace).await.to_string();
        self.request::<_, ()>(
            Method::GET,
            &["workspace", workspace.as_str(), "thread", &thread, "history"],
            None,
        )
        .await
    }

    /// Like [`Self::try_chat_history`], but offline-tolerant: any failure
    /// yields an empty list.
    pub async fn chat_history(&self, workspace: &WorkspaceSlug) -> Vec<HistoryEntry> {
        self.try_chat_history(workspace).await.unwrap_or_else(|err| {
            warn!(%workspace, "chat history unavailable: {err}");
            Vec::new()
        })
    }

    // ===== Remote threads ====================================================

    /// Named threads of a workspace (empty on failure).
    pub async fn threads(&self, workspace: &WorkspaceSlug) -> Vec<RemoteThread> {
        match self
            .request::<ThreadList, ()>(
                Method::GET,
                &["workspace", workspace.as_str(), "threads"],
                None,
            )
            .await
        {
            Ok(list) => list.threads,
            Err(err) => {
                warn!(%workspace, "thread list unavailable: {err}");
                Vec::new()
            }
        }
    }

    /// Create a named thread.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server reports one.
    pub async fn create_thread(&self, workspace: &WorkspaceSlug) -> ChatResult<RemoteThread> {
        let envelope: ThreadEnvelope = self
            .request::<_, ()>(
                Method::POST,
                &["workspace", workspace.as_str(), "thread", "new"],
                None,
            )
            .await?;
        if let Some(message) = envelope.error {
            return Err(ChatError::Api {
                status: 200,
                message,
            });
        }
        let thread = envelope.thread.ok_or_else(|| ChatError::Api {
            status: 200,
            message: "response carries no thread".to_string(),
        })?;
        info!(%workspace, thread = %thread.slug, "thread created");
        Ok(thread)
    }

    /// Delete a named thread.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn delete_thread(&self, workspace: &WorkspaceSlug, thread_slug: &str) -> ChatResult<()> {
        self.request::<Value, ()>(
            Method::DELETE,
            &["workspace", workspace.as_str(), "thread", thread_slug],
            None,
        )
        .await?;
        info!(%workspace, thread = thread_slug, "thread deleted");
        Ok(())
    }

    /// Rename a named thread; returns the updated thread when the server echoes it.
    ///
    /// # Errors
    /// Returns an error if `name` is blank or the request fails.
    pub async fn rename_thread(
        &self,
        workspace: &WorkspaceSlug,
        thread_slug: &str,
        name: &str,
    ) -> ChatResult<Option<RemoteThread>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidInput("thread name must not be empty".to_string()));
        }
        let envelope: ThreadEnvelope = self
            .request(
                Method::POST,
                &["workspace", workspace.as_str(), "thread", thread_slug, "update"],
                Some(&RenameRequest { name }),
            )
            .await?;
        Ok(envelope.thread)
    }

    /// Exchanges of a named thread (empty on failure).
    pub async fn thread_history(&self, workspace: &WorkspaceSlug, thread_slug: &str) -> Vec<HistoryEntry> {
        match self
            .request::<ThreadChats, ()>(
                Method::GET,
                &["workspace", workspace.as_str(), "thread", thread_slug, "chats"],
                None,
            )
            .await
        {
            Ok(chats) => chats.history,
            Err(err) => {
                warn!(%workspace, thread = thread_slug, "thread history unavailable: {err}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryKeyValueStore;
    use crate::test_support::spawn_backend;

    fn client(base_url: &str) -> (ApiClient, StorageService) {
        let storage = StorageService::new(Arc::new(MemoryKeyValueStore::new()));
        let config = ClientConfig::new().with_base_url(base_url);
        let api = ApiClient::new(&config, storage.clone(), ThreadResolver::new(storage.clone())).unwrap();
        (api, storage)
    }

    fn slug() -> WorkspaceSlug {
        WorkspaceSlug::new("cesame").unwrap()
    }

    #[tokio::test]
    async fn test_login_persists_token_and_user() {
        let router = Router::new().route(
            "/api/auth/login",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "valid": true,
                    "token": format!("tok-{}", body["username"].as_str().unwrap_or_default()),
                    "user": {"id": 1, "username": body["username"]},
                }))
            }),
        );
        let base = spawn_backend(router).await;
        let (api, storage) = client(&base);

        let response = api.login("demo", "pw").await.unwrap();
        assert!(response.valid);
        assert_eq!(storage.auth_token().await.as_deref(), Some("tok-demo"));
        assert_eq!(storage.auth_user().await.unwrap().username, "demo");
    }

    #[tokio::test]
    async fn test_error_message_taken_from_body() {
        let router = Router::new()
            .route(
                "/api/auth/login",
                post(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid credentials"}))) }),
            )
            .route(
                "/api/workspaces",
                get(|| async { (StatusCode::BAD_GATEWAY, Json(json!({"error": "upstream down"}))) }),
            );
        let base = spawn_backend(router).await;
        let (api, storage) = client(&base);

        match api.login("demo", "bad").await {
            Err(ChatError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid credentials");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(storage.auth_token().await.is_none());

        match api.workspaces().await {
            Err(ChatError::Api { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_body_uses_status() {
        let router = Router::new().route("/api/workspaces", get(|| async { StatusCode::NOT_FOUND }));
        let base = spawn_backend(router).await;
        let (api, _) = client(&base);

        let err = api.workspaces().await.unwrap_err();
        assert!(matches!(err, ChatError::Api { status: 404, ref message } if message == "HTTP 404"));
    }

    #[tokio::test]
    async fn test_logout_clears_local_state_even_if_remote_fails() {
        let router = Router::new().route(
            "/api/auth/logout",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_backend(router).await;
        let (api, storage) = client(&base);
        storage.save_auth_token("tok").await;
        api.threads.get_or_create(&slug()).await;

        api.logout().await;
        assert!(storage.auth_token().await.is_none());
        assert!(api.threads.current(&slug()).is_none());
    }

    #[tokio::test]
    async fn test_chat_history_uses_current_thread_and_bearer() {
        let router = Router::new().route(
            "/api/workspace/{slug}/thread/{thread}/history",
            get(|Path((slug, thread)): Path<(String, String)>, headers: HeaderMap| async move {
                let auth = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!([{ "id": 1, "prompt": slug, "response": format!("{thread}|{auth}") }]))
            }),
        );
        let base = spawn_backend(router).await;
        let (api, storage) = client(&base);
        storage.save_auth_token("tok").await;

        let entries = api.chat_history(&slug()).await;
        let thread = api.threads.current(&slug()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prompt, "cesame");
        assert_eq!(entries[0].response, format!("{thread}|Bearer tok"));
    }

    #[tokio::test]
    async fn test_chat_history_offline_is_empty() {
        let router = Router::new();
        let base = spawn_backend(router).await;
        let (api, _) = client(&base);

        assert!(api.chat_history(&slug()).await.is_empty());
        assert!(api.try_chat_history(&slug()).await.is_err());
    }

    #[tokio::test]
    async fn test_thread_management_routes() {
        let router = Router::new()
            .route(
                "/api/workspace/{slug}/threads",
                get(|| async { Json(json!({"threads": [{"id": 4, "slug": "conversation-1", "name": "Nouvelle conversation"}]})) }),
            )
            .route(
                "/api/workspace/{slug}/thread/new",
                post(|| async { Json(json!({"thread": {"id": 5, "slug": "thread-5", "name": "Nouvelle conversation"}})) }),
            )
            .route(
                "/api/workspace/{slug}/thread/{thread}",
                delete(|| async { StatusCode::OK }),
            )
            .route(
                "/api/workspace/{slug}/thread/{thread}/update",
                post(|Path((_, thread)): Path<(String, String)>, Json(body): Json<Value>| async move {
                    Json(json!({"thread": {"id": 5, "slug": thread, "name": body["name"]}, "message": "Thread renamed"}))
                }),
            )
            .route(
                "/api/workspace/{slug}/thread/{thread}/chats",
                get(|| async { Json(json!({"history": [{"id": "a1", "prompt": "p", "response": "r"}]})) }),
            );
        let base = spawn_backend(router).await;
        let (api, _) = client(&base);

        let threads = api.threads(&slug()).await;
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].slug, "conversation-1");

        let created = api.create_thread(&slug()).await.unwrap();
        assert_eq!(created.slug, "thread-5");

        api.delete_thread(&slug(), "thread-5").await.unwrap();

        let renamed = api.rename_thread(&slug(), "thread-5", " Projet ").await.unwrap();
        assert_eq!(renamed.unwrap().name, "Projet");
        assert!(matches!(
            api.rename_thread(&slug(), "thread-5", "  ").await,
            Err(ChatError::InvalidInput(_))
        ));

        let history = api.thread_history(&slug(), "thread-5").await;
        assert_eq!(history[0].id, "a1");
    }

    #[tokio::test]
    async fn test_create_thread_surfaces_server_error() {
        let router = Router::new().route(
            "/api/workspace/{slug}/thread/new",
            post(|| async { Json(json!({"thread": null, "error": "quota reached"})) }),
        );
        let base = spawn_backend(router).await;
        let (api, _) = client(&base);

        let err = api.create_thread(&slug()).await.unwrap_err();
        assert!(matches!(err, ChatError::Api { ref message, .. } if message == "quota reached"));
    }
}
