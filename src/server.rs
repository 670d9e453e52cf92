//! Server assembly: wires the orchestrator, config store, and router
//! together and runs the listener until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState};
use crate::catalog::StepCatalog;
use crate::config::ConfigStore;
use crate::orchestrator::Orchestrator;
use crate::runner::ShellRunner;

pub struct ServerConfig {
    pub port: u16,
    /// Deployment base directory: config artifacts live here and scripts
    /// run with it as their working directory.
    pub base_dir: PathBuf,
    /// Directory holding the deployment scripts. Defaults to
    /// `<base_dir>/scripts`.
    pub scripts_dir: Option<PathBuf>,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            base_dir: PathBuf::from("."),
            scripts_dir: None,
            dev_mode: false,
        }
    }
}

pub fn build_state(config: &ServerConfig) -> Arc<AppState> {
    let scripts_dir = config
        .scripts_dir
        .clone()
        .unwrap_or_else(|| config.base_dir.join("scripts"));
    let catalog = StepCatalog::bundled(&scripts_dir);
    let orchestrator = Arc::new(Orchestrator::new(
        catalog,
        Arc::new(ShellRunner),
        config.base_dir.clone(),
    ));
    Arc::new(AppState {
        orchestrator,
        config: ConfigStore::new(&config.base_dir),
    })
}

pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.base_dir)
        .with_context(|| format!("creating {}", config.base_dir.display()))?;

    let state = build_state(&config);
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(addr = %listener.local_addr()?, "deployment console listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        return;
    }
    info!("shutdown requested");
}
