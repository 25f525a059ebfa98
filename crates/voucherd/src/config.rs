// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::credential::Credential;
use crate::sync::RetryPolicy;

/// Configuration for the voucherd controller integration service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "voucherd", version, about = "Controller integration layer for voucher sales")]
pub struct VoucherdConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "VOUCHERD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "VOUCHERD_PORT")]
    pub port: u16,

    /// Bearer token for the HTTP API. If unset, auth is disabled.
    #[arg(long, env = "VOUCHERD_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Database holding the credential record and the mirror.
    #[arg(long, default_value = "sqlite:voucherd.db?mode=rwc", env = "VOUCHERD_DATABASE_URL")]
    pub database_url: String,

    /// Reconciliation interval in seconds.
    #[arg(long, default_value_t = 300, env = "VOUCHERD_SYNC_INTERVAL_SECS")]
    pub sync_interval_secs: u64,

    /// Refresh tokens this many seconds before they expire.
    #[arg(long, default_value_t = 60, env = "VOUCHERD_TOKEN_SAFETY_MARGIN_SECS")]
    pub token_safety_margin_secs: u64,

    /// Timeout for every controller request in milliseconds.
    #[arg(long, default_value_t = 15000, env = "VOUCHERD_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "VOUCHERD_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Attempts per sync step before it is marked failed.
    #[arg(long, default_value_t = 3, env = "VOUCHERD_SYNC_MAX_ATTEMPTS")]
    pub sync_max_attempts: u32,

    /// Initial step retry backoff in milliseconds.
    #[arg(long, default_value_t = 500, env = "VOUCHERD_SYNC_BACKOFF_BASE_MS")]
    pub sync_backoff_base_ms: u64,

    /// Step retry backoff ceiling in milliseconds.
    #[arg(long, default_value_t = 30000, env = "VOUCHERD_SYNC_BACKOFF_MAX_MS")]
    pub sync_backoff_max_ms: u64,

    /// Wait used when the controller rate-limits without a hint.
    #[arg(long, default_value_t = 5, env = "VOUCHERD_RATE_LIMIT_DEFAULT_SECS")]
    pub rate_limit_default_secs: u64,

    /// Currency for voucher prices when a plan does not name one.
    #[arg(long, default_value = "USD", env = "VOUCHERD_CURRENCY")]
    pub currency: String,

    /// Bootstrap controller URL (written to the store at startup).
    #[arg(long, env = "VOUCHERD_CONTROLLER_URL")]
    pub controller_url: Option<String>,

    /// Bootstrap tenant (omadac) id.
    #[arg(long, env = "VOUCHERD_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Bootstrap client id.
    #[arg(long, env = "VOUCHERD_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Bootstrap client secret.
    #[arg(long, env = "VOUCHERD_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

impl VoucherdConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.sync_interval_secs > 0, "sync interval must be positive");
        anyhow::ensure!(self.sync_max_attempts > 0, "sync max attempts must be positive");
        anyhow::ensure!(self.request_timeout_ms > 0, "request timeout must be positive");
        anyhow::ensure!(
            self.sync_backoff_base_ms <= self.sync_backoff_max_ms,
            "sync backoff base exceeds its maximum"
        );
        crate::controller::units::currency_code(&self.currency)?;
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn rate_limit_default(&self) -> Duration {
        Duration::from_secs(self.rate_limit_default_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_max_attempts,
            base_delay: Duration::from_millis(self.sync_backoff_base_ms),
            max_delay: Duration::from_millis(self.sync_backoff_max_ms),
        }
    }

    /// Credential supplied on the command line or environment, when all four
    /// fields are present.
    pub fn bootstrap_credential(&self) -> Option<Credential> {
        match (&self.controller_url, &self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(url), Some(tenant), Some(client), Some(secret)) => {
                Some(Credential::new(url.as_str(), tenant.as_str(), client.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}
