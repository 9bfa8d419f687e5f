// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sandbard: the sandbox control-plane daemon.
//!
//! Wires the store, host gateway, source host, scheduler, and HTTP server
//! together; recovers state on boot; shuts down gracefully on SIGINT/SIGTERM.

mod env;
mod startup;

use startup::{DaemonError, DaemonHandle};

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("sandbard: failed to start runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sandbard: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), DaemonError> {
    let state_dir = env::state_dir();
    let config_path = env::config_path();

    let handle = DaemonHandle::start(&state_dir, &config_path).await?;
    tracing::info!(
        state_dir = %state_dir.display(),
        listen = %handle.listen_addr(),
        "sandbard running"
    );

    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
