// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::VoucherdConfig;
use crate::controller::{ApiClient, Controller};
use crate::credential::CredentialHandle;
use crate::diagnostics::Diagnostics;
use crate::store::{Mirror, SqliteStore};
use crate::sync::SyncScheduler;
use crate::token::TokenCache;
use crate::voucher::VoucherIssuer;

/// Shared service state.
pub struct AppState {
    pub config: VoucherdConfig,
    pub credentials: Arc<CredentialHandle>,
    pub tokens: Arc<TokenCache>,
    pub controller: Arc<Controller>,
    pub mirror: Arc<dyn Mirror>,
    pub scheduler: Arc<SyncScheduler>,
    pub issuer: VoucherIssuer,
    pub diagnostics: Diagnostics,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component over `store`. The scheduler is not started.
    pub async fn build(config: VoucherdConfig, store: Arc<SqliteStore>) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let shutdown = CancellationToken::new();

        let credentials = CredentialHandle::load(store.clone()).await?;
        let api = Arc::new(ApiClient::new(
            config.request_timeout(),
            config.connect_timeout(),
            config.rate_limit_default(),
            config.currency.as_str(),
        )?);
        let tokens = Arc::new(TokenCache::new(
            api.clone(),
            credentials.clone(),
            config.token_safety_margin(),
        ));
        let controller = Arc::new(Controller::new(api.clone(), tokens.clone(), credentials.clone()));
        let mirror: Arc<dyn Mirror> = store;

        let scheduler = SyncScheduler::new(
            controller.clone(),
            tokens.clone(),
            mirror.clone(),
            config.retry_policy(),
            config.sync_interval(),
            shutdown.child_token(),
        );
        let issuer = VoucherIssuer::new(
            controller.clone(),
            mirror.clone(),
            scheduler.clone(),
            config.currency.as_str(),
        );
        let diagnostics =
            Diagnostics::new(api, tokens.clone(), credentials.clone(), scheduler.clone());

        Ok(Arc::new(Self {
            config,
            credentials,
            tokens,
            controller,
            mirror,
            scheduler,
            issuer,
            diagnostics,
            shutdown,
        }))
    }
}
