//! HTTP route handlers of the demo backend.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::DemoState;
use crate::api::{LoginRequest, LoginResponse, Workspace};
use crate::auth::AuthUser;
use crate::stream::DONE_SENTINEL;

/// Create the router; every backend route lives under `/api`.
pub fn create_router(state: Arc<DemoState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/workspaces", get(workspaces))
        .route("/api/workspace/{slug}/thread/{thread}/history", get(history))
        .route("/api/workspace/{slug}/thread/{thread}/stream-chat", post(stream_chat))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "cesame-demo-backend",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Any non-blank credentials are accepted.
async fn login(Json(request): Json<LoginRequest>) -> Response {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "username and password are required"})),
        )
            .into_response();
    }

    info!(username = %request.username, "demo login");
    Json(LoginResponse {
        valid: true,
        token: Some(format!("demo_token_{}", Uuid::new_v4().simple())),
        user: Some(AuthUser {
            id: 1,
            username: request.username.clone(),
            email: request.username.contains('@').then(|| request.username.clone()),
        }),
        message: Some("Login successful (demo mode)".to_string()),
    })
    .into_response()
}

async fn logout() -> impl IntoResponse {
    Json(json!({"success": true}))
}

async fn workspaces() -> Json<Vec<Workspace>> {
    let workspace = |id, slug: &str, name: &str, description: &str| Workspace {
        id,
        slug: slug.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
    };
    Json(vec![
        workspace(1, "bateson", "Bateson", "Assistant de recherche"),
        workspace(2, "cesame", "CESAME", "Agent IA principal"),
        workspace(3, "support", "Support Client", "Assistance technique"),
    ])
}

async fn history(
    State(state): State<Arc<DemoState>>,
    Path((slug, thread)): Path<(String, String)>,
) -> impl IntoResponse {
    Json(state.history(&slug, &thread))
}

#[derive(Debug, Deserialize)]
struct StreamChatBody {
    message: String,
    #[serde(default)]
    attachments: Vec<Value>,
}

/// The request is sent as `text/plain`, so the JSON body is decoded by hand.
async fn stream_chat(
    State(state): State<Arc<DemoState>>,
    Path((slug, thread)): Path<(String, String)>,
    body: String,
) -> Response {
    let request: StreamChatBody = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("invalid request body: {err}")).into_response();
        }
    };
    if request.message.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "message must not be empty").into_response();
    }
    debug!(%slug, %thread, attachments = request.attachments.len(), "demo stream requested");

    let reply = demo_reply(&request.message);
    let words = split_words(&reply);
    let delay = state.word_delay;

    let frames = futures::stream::iter(words).then(move |word| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, Infallible>(Event::default().data(json!({"textResponse": word}).to_string()))
    });
    // Reached only if the client stayed until the end.
    let done = futures::stream::once(async move {
        state.record(&slug, &thread, request.message, reply);
        Ok::<_, Infallible>(Event::default().data(DONE_SENTINEL))
    });

    Sse::new(frames.chain(done)).into_response()
}

const REPLY_TEMPLATES: [&str; 3] = [
    "C'est une excellente question concernant \"{}\". En mode démo, je simule une réponse de l'IA. L'interface fonctionne parfaitement avec le streaming en temps réel.",
    "Je comprends votre demande sur \"{}\". Dans un environnement de production, je serais connecté au backend CESAME et pourrais vous fournir des réponses détaillées et contextuelles basées sur votre workspace.",
    "Merci pour votre message \"{}\". Ceci est une réponse de démonstration envoyée mot par mot.",
];

/// Canned answer quoting the prompt; the template depends only on the prompt.
fn demo_reply(message: &str) -> String {
    let template = REPLY_TEMPLATES[message.chars().count() % REPLY_TEMPLATES.len()];
    template.replacen("{}", message.trim(), 1)
}

/// Words with their trailing space, so that concatenation restores `text`.
fn split_words(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split(' ').collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| if i < last { format!("{word} ") } else { (*word).to_string() })
        .collect()
}
