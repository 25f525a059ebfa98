// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing checks over the credential, token and sync layers.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use crate::controller::{ApiClient, ControllerError, ErrorKind};
use crate::credential::{redact, Credential, CredentialHandle, CredentialSummary};
use crate::sync::{SyncScheduler, SyncStatus};
use crate::token::{TokenCache, TokenStatus};

/// Result of a live credential check. `reason` never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialTestReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub latency_ms: u64,
}

pub struct Diagnostics {
    api: Arc<ApiClient>,
    tokens: Arc<TokenCache>,
    credentials: Arc<CredentialHandle>,
    scheduler: Arc<SyncScheduler>,
}

impl Diagnostics {
    pub fn new(
        api: Arc<ApiClient>,
        tokens: Arc<TokenCache>,
        credentials: Arc<CredentialHandle>,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self { api, tokens, credentials, scheduler }
    }

    /// Exchange a fresh token and make one authenticated read. The cache is
    /// neither read nor populated.
    pub async fn test_credentials(&self) -> CredentialTestReport {
        let started = Instant::now();
        let result = self.check_live().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                tracing::info!(latency_ms, "credential test passed");
                CredentialTestReport { ok: true, kind: None, reason: None, latency_ms }
            }
            Err(e) => {
                if e.is_credential() {
                    self.tokens.invalidate().await;
                }
                let reason = self.redacted(&e.to_string()).await;
                tracing::warn!(kind = %e.kind(), reason = %reason, latency_ms, "credential test failed");
                CredentialTestReport { ok: false, kind: Some(e.kind()), reason: Some(reason), latency_ms }
            }
        }
    }

    pub async fn clear_token_cache(&self) {
        self.tokens.invalidate().await;
    }

    pub async fn credential_summary(&self) -> Option<CredentialSummary> {
        self.credentials.summary().await
    }

    /// Store a new credential and drop any token issued under the old one.
    pub async fn update_credentials(
        &self,
        credential: Credential,
    ) -> Result<CredentialSummary, ControllerError> {
        let summary = self.credentials.update(credential).await?;
        self.tokens.invalidate().await;
        tracing::info!(
            controller_url = %summary.controller_url,
            tenant_id = %summary.tenant_id,
            "controller credential updated"
        );
        Ok(summary)
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.scheduler.status().await
    }

    pub async fn token_status(&self) -> TokenStatus {
        self.tokens.status().await
    }

    /// Strip the active secret and the cached access token from `text`.
    pub async fn redacted(&self, text: &str) -> String {
        let secrets: Vec<String> = [self.credentials.secret().await, self.tokens.cached_value().await]
            .into_iter()
            .flatten()
            .collect();
        let refs: Vec<&str> = secrets.iter().map(String::as_str).collect();
        redact(text, &refs)
    }

    async fn check_live(&self) -> Result<(), ControllerError> {
        let credential = self.credentials.current().await?;
        let token = self.tokens.fetch_fresh().await?;
        self.api.test_connectivity(&credential, &token).await
    }
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
