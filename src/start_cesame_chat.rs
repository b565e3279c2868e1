//! Startup helpers for the terminal client and the demo backend.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::core::config::{ClientConfig, PORT_ENV};
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::WorkspaceSlug;
use crate::server::{self, DemoState};
use crate::session::{ChatSession, ExchangeOutcome};
use crate::storage::{MemoryKeyValueStore, SqliteKeyValueStore, StorageService};

/// Exit code used when the user interrupts generation.
const INTERRUPTED: u8 = 130;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Run one exchange from the command line (used by the `cesame-chat` binary).
///
/// Usage: `cesame-chat <workspace> <message...>`. The answer is streamed to
/// stdout; Ctrl-C stops generation.
///
/// # Returns
/// `ExitCode::SUCCESS` when the answer completed, `130` when stopped, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting CESAME chat v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let workspace = args.next().map(WorkspaceSlug::new);
    let message = args.collect::<Vec<_>>().join(" ");
    let workspace = match workspace {
        Some(Ok(slug)) if !message.trim().is_empty() => slug,
        Some(Err(e)) => {
            tracing::error!("Invalid workspace: {e}");
            return ExitCode::from(2);
        }
        _ => {
            tracing::error!("Usage: cesame-chat <workspace> <message...>");
            return ExitCode::from(2);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(chat_once(ClientConfig::from_env(), workspace, &message)) {
        Ok(ExchangeOutcome::Completed(_)) => ExitCode::SUCCESS,
        Ok(ExchangeOutcome::Stopped) => {
            tracing::info!("Generation stopped");
            ExitCode::from(INTERRUPTED)
        }
        Err(e) => {
            tracing::error!("Chat failed: {e}");
            ExitCode::from(1)
        }
    }
}

async fn chat_once(
    mut config: ClientConfig,
    workspace: WorkspaceSlug,
    message: &str,
) -> ChatResult<ExchangeOutcome> {
    if config.demo_mode {
        config.api_base_url = spawn_demo_backend().await?;
        tracing::info!("Demo mode: using in-process backend at {}", config.api_base_url);
    }

    let storage = open_storage(&config).await?;
    storage.save_selected_workspace(&workspace).await;
    let session = ChatSession::from_config(&config, storage, workspace)?;
    if config.demo_mode {
        session.api().login("demo@cesame.fr", "demo").await?;
    }

    let shown = session.load_history().await?;
    tracing::info!("{} messages in history", shown.len());

    let handle = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let mut out = std::io::stdout().lock();
    let outcome = session
        .send(message, |delta| {
            let _ = write!(out, "{}", delta.text_response).and_then(|()| out.flush());
        })
        .await?;
    let _ = writeln!(out);
    Ok(outcome)
}

async fn open_storage(config: &ClientConfig) -> ChatResult<StorageService> {
    match &config.storage_path {
        Some(path) => {
            let store = SqliteKeyValueStore::open(path).await?;
            tracing::info!("Local cache: {}", path.display());
            Ok(StorageService::new(Arc::new(store)))
        }
        None => Ok(StorageService::new(Arc::new(MemoryKeyValueStore::new()))),
    }
}

async fn spawn_demo_backend() -> ChatResult<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| ChatError::Config(format!("cannot bind demo backend: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| ChatError::Config(format!("cannot bind demo backend: {e}")))?;
    let app = server::create_router(DemoState::new(server::state::DEFAULT_WORD_DELAY));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Demo backend error: {e}");
        }
    });
    Ok(format!("http://{addr}/api"))
}

/// Run the demo backend until Ctrl-C (used by the `cesame-demo-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_demo_server() -> ExitCode {
    init_tracing();
    tracing::info!("Starting CESAME demo backend v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let state = DemoState::new(server::state::DEFAULT_WORD_DELAY);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    };
    if let Err(e) = rt.block_on(server::run_server_with_shutdown(state, get_port(), shutdown)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Get configured demo backend port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
