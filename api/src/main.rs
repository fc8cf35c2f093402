mod api_error;
mod docs_payload;
mod handlers;
mod query_payload;

use std::sync::Arc;

use anyhow::Context;
use doc_rag::{RagSystem, Settings};

use crate::handlers::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Also loads .env
    let settings = Settings::from_env().context("Failed to load settings")?;
    log::info!("Settings: {:?}", settings);

    tokio::fs::create_dir_all(&settings.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.upload_dir.display()))?;

    let rag = RagSystem::from_settings(&settings)
        .await
        .context("Failed to initialize RAG system")?;
    log::info!("RAG system initialized successfully");

    let state = Arc::new(AppState {
        rag,
        upload_dir: settings.upload_dir.clone(),
    });
    let app = handlers::router(state.clone(), settings.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.rag.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutting down");
}
