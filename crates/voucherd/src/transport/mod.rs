// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for operators and the sales front end.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all voucherd routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Credential administration and diagnostics
        .route("/api/v1/credentials", put(http::update_credentials))
        .route("/api/v1/credentials/summary", get(http::credential_summary))
        .route("/api/v1/credentials/test", post(http::test_credentials))
        .route("/api/v1/token-cache/clear", post(http::clear_token_cache))
        .route("/api/v1/token-cache/status", get(http::token_status))
        // Mirror reads and on-demand issuance
        .route("/api/v1/sites", get(http::list_sites))
        .route(
            "/api/v1/sites/{site_id}/vouchers",
            get(http::list_vouchers).post(http::create_voucher),
        )
        .route("/api/v1/sites/{site_id}/usage", get(http::site_usage))
        // Reconciliation
        .route("/api/v1/sync/status", get(http::sync_status))
        .route("/api/v1/sync/trigger", post(http::trigger_sync))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
