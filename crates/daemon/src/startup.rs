// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly: config, tracing, lockfile, recovery, task spawning.

use fs2::FileExt;
use sb_agent::{AgentLoop, HttpModelClient};
use sb_core::{Config, SystemClock};
use sb_engine::{spawn_scheduler, Orchestrator};
use sb_githost::{CredentialStore, HttpSourceHost};
use sb_host::{HostGateway, HttpHost};
use sb_server::{router, ServerState};
use sb_storage::Store;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] sb_core::ConfigError),
    #[error("storage error: {0}")]
    Store(#[from] sb_storage::StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another sandbard instance holds the lock at {0}")]
    Locked(String),
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

type ProdOrchestrator = Orchestrator<HttpHost, HttpSourceHost, SystemClock>;

/// A running daemon: server + scheduler tasks, stoppable once.
pub struct DaemonHandle {
    listen_addr: String,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    // Held for the daemon's lifetime; dropping releases the lock.
    _lockfile: File,
    _log_guard: tracing_appender::non_blocking::WorkerGuard,
}

impl DaemonHandle {
    pub async fn start(state_dir: &Path, config_path: &Path) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(state_dir)?;

        let lockfile = acquire_lock(state_dir)?;
        let log_guard = init_tracing(state_dir);

        let config = if config_path.exists() {
            Config::load(config_path)?
        } else {
            tracing::info!(path = %config_path.display(), "no config file, using defaults + env");
            Config::from_env()
        };
        let config = Arc::new(config);

        let store = Store::open(&state_dir.join("store"))?;
        let orch: ProdOrchestrator = Orchestrator::new(
            store,
            HostGateway::new(HttpHost::new(&config.host.base_url, &config.host.auth_secret)),
            Arc::new(HttpSourceHost::new(&config.githost.base_url)),
            CredentialStore::new(),
            Arc::clone(&config),
            SystemClock,
        );

        // Repair drift and resume interrupted provisioning before any
        // scheduler tick runs.
        if let Err(e) = orch.recover_on_startup().await {
            tracing::warn!(error = %e, "startup recovery incomplete, continuing");
        }

        let shutdown = CancellationToken::new();
        let mut tasks = spawn_scheduler(orch.clone(), shutdown.clone());

        let model = Arc::new(HttpModelClient::from_config(&config.agent.model));
        let agent = AgentLoop::new(orch.clone(), model);
        let app = router(ServerState { orch, agent });

        let listen_addr = config.server.listen_addr.clone();
        let listener = tokio::net::TcpListener::bind(&listen_addr)
            .await
            .map_err(|source| DaemonError::Bind { addr: listen_addr.clone(), source })?;

        let server_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server exited with error");
            }
        }));

        Ok(Self {
            listen_addr,
            shutdown,
            tasks,
            _lockfile: lockfile,
            _log_guard: log_guard,
        })
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Cancel every task and wait for them to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "task did not shut down cleanly");
            }
        }
    }
}

/// Single-instance lock on the state directory.
fn acquire_lock(state_dir: &Path) -> Result<File, DaemonError> {
    let path = state_dir.join("sandbard.lock");
    let file = File::create(&path)?;
    file.try_lock_exclusive()
        .map_err(|_| DaemonError::Locked(path.display().to_string()))?;
    Ok(file)
}

/// Env-filtered stdout logging plus a daily-rolled file in the state dir.
fn init_tracing(state_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(state_dir.join("logs"), "sandbard.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init();

    guard
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
