// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Voucherd: controller integration layer for hotspot voucher sales.

pub mod config;
pub mod controller;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod state;
pub mod store;
pub mod sync;
pub mod test_support;
pub mod token;
pub mod transport;
pub mod voucher;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::VoucherdConfig;
use crate::credential::CredentialStore;
use crate::state::AppState;
use crate::store::SqliteStore;
use crate::transport::build_router;

/// Run the service until shutdown.
pub async fn run(config: VoucherdConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);

    if let Some(credential) = config.bootstrap_credential() {
        let credential = credential.normalized();
        credential.validate()?;
        store.put(&credential).await?;
        tracing::info!(controller_url = %credential.controller_url, "bootstrap credential stored");
    }

    let state = AppState::build(config, store).await?;
    let shutdown = state.shutdown.clone();
    spawn_signal_handler(shutdown.clone());
    state.scheduler.spawn();

    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("voucherd listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    tracing::info!("http server stopped, draining sync scheduler");
    state.scheduler.shutdown().await;
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        let term = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!(err = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let term = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = term => {}
        }
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });
}
