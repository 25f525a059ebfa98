// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for voucherd.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::controller::{ControllerError, ErrorKind};
use crate::credential::{Credential, CredentialSummary};
use crate::error::{controller_error_response, ApiError};
use crate::model::PlanSpec;
use crate::state::AppState;
use crate::sync::{SyncPhase, SyncStatus};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub credential_configured: bool,
    pub sync_phase: SyncPhase,
}

#[derive(Debug, Serialize)]
pub struct CredentialSummaryResponse {
    pub configured: bool,
    #[serde(flatten)]
    pub summary: Option<CredentialSummary>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCredentialRequest {
    pub controller_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    /// Sites whose last voucher create had an unknown outcome.
    pub unresolved_sites: Vec<String>,
}

/// Render `err` with the active secret stripped from its message.
async fn failure(s: &AppState, err: &ControllerError) -> Response {
    let message = s.diagnostics.redacted(&err.to_string()).await;
    controller_error_response(err, message)
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        credential_configured: s.credentials.is_configured().await,
        sync_phase: s.diagnostics.sync_status().await.phase,
    })
}

/// `GET /api/v1/credentials/summary`
pub async fn credential_summary(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = s.diagnostics.credential_summary().await;
    Json(CredentialSummaryResponse { configured: summary.is_some(), summary })
}

/// `PUT /api/v1/credentials`: replace the active credential.
pub async fn update_credentials(
    State(s): State<Arc<AppState>>,
    Json(req): Json<UpdateCredentialRequest>,
) -> Response {
    let secret = req.client_secret.clone();
    let credential =
        Credential::new(req.controller_url, req.tenant_id, req.client_id, req.client_secret);
    match s.diagnostics.update_credentials(credential).await {
        Ok(summary) => Json(summary).into_response(),
        // Incomplete or malformed submissions.
        Err(e) if e.kind() == ErrorKind::Credential => ApiError::BadRequest
            .to_http_response(crate::credential::redact(&e.to_string(), &[secret.as_str()]))
            .into_response(),
        Err(e) => failure(&s, &e).await,
    }
}

/// `POST /api/v1/credentials/test`
pub async fn test_credentials(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.diagnostics.test_credentials().await)
}

/// `POST /api/v1/token-cache/clear`
pub async fn clear_token_cache(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    s.diagnostics.clear_token_cache().await;
    Json(ClearedResponse { cleared: true })
}

/// `GET /api/v1/token-cache/status`
pub async fn token_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.diagnostics.token_status().await)
}

/// `GET /api/v1/sites`
pub async fn list_sites(State(s): State<Arc<AppState>>) -> Response {
    match s.mirror.list_sites().await {
        Ok(sites) => Json(sites).into_response(),
        Err(e) => failure(&s, &e).await,
    }
}

/// `GET /api/v1/sites/{site_id}/vouchers`
pub async fn list_vouchers(
    State(s): State<Arc<AppState>>,
    Path(site_id): Path<String>,
) -> Response {
    match s.mirror.list_vouchers(&site_id).await {
        Ok(vouchers) => Json(vouchers).into_response(),
        Err(e) => failure(&s, &e).await,
    }
}

/// `POST /api/v1/sites/{site_id}/vouchers`: issue one voucher now.
pub async fn create_voucher(
    State(s): State<Arc<AppState>>,
    Path(site_id): Path<String>,
    Json(plan): Json<PlanSpec>,
) -> Response {
    match s.issuer.create(&site_id, &plan).await {
        Ok(voucher) => (StatusCode::CREATED, Json(voucher)).into_response(),
        Err(e) => failure(&s, &e).await,
    }
}

/// `GET /api/v1/sites/{site_id}/usage`
pub async fn site_usage(State(s): State<Arc<AppState>>, Path(site_id): Path<String>) -> Response {
    match s.mirror.usage(&site_id).await {
        Ok(Some(usage)) => Json(usage).into_response(),
        Ok(None) => ApiError::from(ErrorKind::NotFound)
            .to_http_response(format!("no usage recorded for site {site_id}"))
            .into_response(),
        Err(e) => failure(&s, &e).await,
    }
}

/// `GET /api/v1/sync/status`
pub async fn sync_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SyncStatusResponse {
        status: s.diagnostics.sync_status().await,
        unresolved_sites: s.issuer.unresolved_sites().await,
    })
}

/// `POST /api/v1/sync/trigger`: start a run unless one is in progress.
pub async fn trigger_sync(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(s.scheduler.trigger()))
}
