// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller integration: typed API client, error taxonomy, unit conversion,
//! and the token-aware [`Controller`] facade used by sync and issuance.

pub mod client;
pub mod error;
pub mod types;
pub mod units;

pub use client::ApiClient;
pub use error::{ControllerError, ErrorKind};

use std::future::Future;
use std::sync::Arc;

use crate::credential::{Credential, CredentialHandle};
use crate::model::{SiteRecord, UsageSummary, VoucherRecord};
use crate::token::TokenCache;
use types::VoucherGroupRequest;

/// API client bound to the token cache and the active credential.
///
/// A credential rejection on a data call invalidates the token and retries
/// exactly once with a fresh one.
pub struct Controller {
    api: Arc<ApiClient>,
    tokens: Arc<TokenCache>,
    credentials: Arc<CredentialHandle>,
}

impl Controller {
    pub fn new(
        api: Arc<ApiClient>,
        tokens: Arc<TokenCache>,
        credentials: Arc<CredentialHandle>,
    ) -> Self {
        Self { api, tokens, credentials }
    }

    pub async fn list_sites(&self) -> Result<Vec<SiteRecord>, ControllerError> {
        let api = &self.api;
        self.with_token("list_sites", |cred, token| async move { api.list_sites(&cred, &token).await })
            .await
    }

    pub async fn list_vouchers(&self, site_id: &str) -> Result<Vec<VoucherRecord>, ControllerError> {
        let api = &self.api;
        self.with_token("list_vouchers", |cred, token| async move {
            api.list_vouchers(&cred, &token, site_id).await
        })
        .await
    }

    /// A credential rejection proves the create was not applied, so the
    /// single retry is safe. Ambiguous outcomes are returned untouched.
    pub async fn create_voucher(
        &self,
        site_id: &str,
        request: &VoucherGroupRequest,
    ) -> Result<VoucherRecord, ControllerError> {
        let api = &self.api;
        self.with_token("create_voucher", |cred, token| async move {
            api.create_voucher(&cred, &token, site_id, request).await
        })
        .await
    }

    pub async fn usage_summary(&self, site_id: &str) -> Result<UsageSummary, ControllerError> {
        let api = &self.api;
        self.with_token("usage_summary", |cred, token| async move {
            api.usage_summary(&cred, &token, site_id).await
        })
        .await
    }

    async fn with_token<T, F, Fut>(&self, op: &str, call: F) -> Result<T, ControllerError>
    where
        F: Fn(Credential, String) -> Fut,
        Fut: Future<Output = Result<T, ControllerError>>,
    {
        let credential = self.credentials.current().await?;
        let token = self.tokens.get_valid_token().await?;
        match call(credential.clone(), token).await {
            Err(ControllerError::Credential(reason)) => {
                tracing::warn!(op, %reason, "controller refused token, refreshing once");
                self.tokens.invalidate().await;
                let token = self.tokens.get_valid_token().await?;
                let result = call(credential, token).await;
                if matches!(result, Err(ControllerError::Credential(_))) {
                    self.tokens.invalidate().await;
                }
                result
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
