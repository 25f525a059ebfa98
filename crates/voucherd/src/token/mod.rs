// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer token cache for the client-credentials grant.
//!
//! At most one exchange is in flight per process: the first caller that finds
//! no usable token starts a shared refresh future, later callers attach to it
//! and observe the same token or the same error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::controller::ControllerError;
use crate::credential::{Credential, CredentialHandle};

/// Result of one client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token_len", &self.access_token.len())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Performs the token exchange. Implemented by the controller API client.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self, credential: &Credential) -> Result<TokenGrant, ControllerError>;
}

/// In-memory token. Never persisted.
#[derive(Clone)]
pub struct CachedToken {
    pub value: String,
    pub obtained_at: Instant,
    pub expires_at: Instant,
}

impl CachedToken {
    /// Usable only while `now < expires_at - margin`.
    pub fn is_usable(&self, now: Instant, margin: Duration) -> bool {
        match self.expires_at.checked_sub(margin) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<CachedToken, ControllerError>>>;

struct InFlight {
    epoch: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct Slot {
    token: Option<CachedToken>,
    in_flight: Option<InFlight>,
    /// Bumped on every refresh start and every invalidation so a detached
    /// refresh cannot write its result back.
    epoch: u64,
}

/// Non-secret snapshot for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub has_token: bool,
    pub usable: bool,
    pub expires_in_secs: Option<u64>,
    pub refresh_in_flight: bool,
    pub refreshes: u64,
}

pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    credentials: Arc<CredentialHandle>,
    safety_margin: Duration,
    slot: Mutex<Slot>,
    refreshes: AtomicU64,
}

impl TokenCache {
    pub fn new(
        source: Arc<dyn TokenSource>,
        credentials: Arc<CredentialHandle>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            source,
            credentials,
            safety_margin,
            slot: Mutex::new(Slot::default()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return a usable token, refreshing through the single in-flight slot.
    pub async fn get_valid_token(&self) -> Result<String, ControllerError> {
        let (epoch, refresh) = {
            let mut slot = self.slot.lock().await;
            if let Some(token) = &slot.token {
                if token.is_usable(Instant::now(), self.safety_margin) {
                    return Ok(token.value.clone());
                }
            }
            match &slot.in_flight {
                Some(in_flight) => (in_flight.epoch, in_flight.future.clone()),
                None => {
                    slot.epoch += 1;
                    let epoch = slot.epoch;
                    let future = self.start_refresh();
                    slot.in_flight = Some(InFlight { epoch, future: future.clone() });
                    (epoch, future)
                }
            }
        };

        let result = refresh.await;
        self.settle(epoch, &result).await;
        result.map(|token| token.value)
    }

    /// Exchange a new token without reading or populating the cache.
    pub async fn fetch_fresh(&self) -> Result<String, ControllerError> {
        let credential = self.credentials.current().await?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        match exchange(self.source.as_ref(), &credential).await {
            Ok(token) => Ok(token.value),
            Err(e) => {
                if e.is_credential() {
                    self.invalidate().await;
                }
                Err(e)
            }
        }
    }

    /// Drop the cached token and detach any in-flight refresh.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        slot.token = None;
        slot.in_flight = None;
        slot.epoch += 1;
        tracing::info!("token cache invalidated");
    }

    /// The cached token value, if any, regardless of expiry.
    pub async fn cached_value(&self) -> Option<String> {
        self.slot.lock().await.token.as_ref().map(|t| t.value.clone())
    }

    pub async fn status(&self) -> TokenStatus {
        let slot = self.slot.lock().await;
        let now = Instant::now();
        TokenStatus {
            has_token: slot.token.is_some(),
            usable: slot.token.as_ref().is_some_and(|t| t.is_usable(now, self.safety_margin)),
            expires_in_secs: slot
                .token
                .as_ref()
                .map(|t| t.expires_at.saturating_duration_since(now).as_secs()),
            refresh_in_flight: slot.in_flight.is_some(),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }

    fn start_refresh(&self) -> RefreshFuture {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let source = Arc::clone(&self.source);
        let credentials = Arc::clone(&self.credentials);
        async move {
            let credential = credentials.current().await?;
            exchange(source.as_ref(), &credential).await
        }
        .boxed()
        .shared()
    }

    /// Store the outcome of refresh `epoch` unless it was detached.
    async fn settle(&self, epoch: u64, result: &Result<CachedToken, ControllerError>) {
        let mut slot = self.slot.lock().await;
        if slot.in_flight.as_ref().map(|f| f.epoch) != Some(epoch) {
            return;
        }
        slot.in_flight = None;
        match result {
            Ok(token) => slot.token = Some(token.clone()),
            Err(e) if e.is_credential() => {
                slot.token = None;
                tracing::warn!(err = %e, "token exchange rejected credentials");
            }
            Err(e) => tracing::warn!(err = %e, "token exchange failed"),
        }
    }
}

async fn exchange(
    source: &dyn TokenSource,
    credential: &Credential,
) -> Result<CachedToken, ControllerError> {
    let obtained_at = Instant::now();
    let grant = source.exchange(credential).await?;
    if grant.expires_in.is_zero() {
        return Err(ControllerError::Transient(
            "token exchange returned a non-positive lifetime".to_owned(),
        ));
    }
    if grant.access_token.is_empty() {
        return Err(ControllerError::Transient("token exchange returned an empty token".to_owned()));
    }
    tracing::debug!(expires_in_secs = grant.expires_in.as_secs(), "access token obtained");
    Ok(CachedToken {
        value: grant.access_token,
        obtained_at,
        expires_at: obtained_at + grant.expires_in,
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
