// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: in-memory stores, scripted token sources and
//! an application-state builder pointed at a stub controller.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::VoucherdConfig;
use crate::controller::ControllerError;
use crate::credential::{Credential, CredentialStore};
use crate::state::AppState;
use crate::store::SqliteStore;
use crate::token::{TokenGrant, TokenSource};

pub const TEST_TENANT: &str = "T1";
pub const TEST_CLIENT_ID: &str = "abc";
pub const TEST_CLIENT_SECRET: &str = "xyz-secret-value";

/// Credential for the scenario controller at `https://ctrl.example:8043`.
pub fn sample_credential() -> Credential {
    credential_for("https://ctrl.example:8043")
}

/// Credential pointing at `url` (typically a stub server).
pub fn credential_for(url: &str) -> Credential {
    Credential::new(url, TEST_TENANT, TEST_CLIENT_ID, TEST_CLIENT_SECRET)
}

/// Credential store held in memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    record: tokio::sync::Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self { record: tokio::sync::Mutex::new(Some(credential)) }
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Result<Option<Credential>, ControllerError> {
        Ok(self.record.lock().await.clone())
    }

    async fn put(&self, credential: &Credential) -> Result<(), ControllerError> {
        *self.record.lock().await = Some(credential.clone());
        Ok(())
    }
}

/// Token source that issues `tok-<n>` for the n-th exchange, or a scripted
/// failure.
pub struct ScriptedTokenSource {
    ttl: Duration,
    delay_ms: AtomicU64,
    calls: AtomicU32,
    failure: Mutex<Option<ControllerError>>,
}

impl ScriptedTokenSource {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, delay_ms: AtomicU64::new(0), calls: AtomicU32::new(0), failure: Mutex::new(None) }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_with(&self, err: ControllerError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TokenSource for ScriptedTokenSource {
    async fn exchange(&self, _credential: &Credential) -> Result<TokenGrant, ControllerError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failure = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(TokenGrant { access_token: format!("tok-{n}"), expires_in: self.ttl }),
        }
    }
}

/// Configuration with fast retries and no HTTP auth.
pub fn test_config() -> VoucherdConfig {
    VoucherdConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: None,
        database_url: "sqlite::memory:".into(),
        sync_interval_secs: 300,
        token_safety_margin_secs: 60,
        request_timeout_ms: 2000,
        connect_timeout_ms: 1000,
        sync_max_attempts: 3,
        sync_backoff_base_ms: 1,
        sync_backoff_max_ms: 5,
        rate_limit_default_secs: 1,
        currency: "USD".into(),
        controller_url: None,
        tenant_id: None,
        client_id: None,
        client_secret: None,
    }
}

/// Build application state over an in-memory database, with the credential
/// pointing at `controller_url` already stored.
pub async fn test_state(
    config: VoucherdConfig,
    controller_url: &str,
) -> anyhow::Result<Arc<AppState>> {
    let store = Arc::new(SqliteStore::in_memory().await?);
    store.put(&credential_for(controller_url)).await?;
    AppState::build(config, store).await
}
