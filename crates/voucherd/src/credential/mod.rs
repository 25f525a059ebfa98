// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller credential: the single active record per deployment, the store
//! adapter it lives behind, and the process-wide handle the token cache reads.

pub mod handle;

pub use handle::CredentialHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerError;

/// Placeholder shown wherever the client secret would appear.
pub const SECRET_MASK: &str = "********";

/// Replacement for secrets found in surfaced error detail.
pub const REDACTED: &str = "[REDACTED]";

/// Controller access record (one tenant).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub controller_url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("controller_url", &self.controller_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &SECRET_MASK)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Credential {
    pub fn new(
        controller_url: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            controller_url: controller_url.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            updated_at: Utc::now(),
        }
    }

    /// Trim whitespace and trailing slashes from the URL.
    pub fn normalized(mut self) -> Self {
        self.controller_url = self.controller_url.trim().trim_end_matches('/').to_owned();
        self.tenant_id = self.tenant_id.trim().to_owned();
        self.client_id = self.client_id.trim().to_owned();
        self
    }

    /// All four fields must be non-empty before any API call is attempted.
    pub fn validate(&self) -> Result<(), ControllerError> {
        let fields = [
            ("controller_url", &self.controller_url),
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ControllerError::Credential(format!(
                "controller credential incomplete: {name} is empty"
            )));
        }

        let parsed = url::Url::parse(&self.controller_url).map_err(|e| {
            ControllerError::Credential(format!("controller_url is not a valid URL: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ControllerError::Credential(format!(
                "controller_url must be http or https, got {}",
                parsed.scheme()
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            controller_url: self.controller_url.clone(),
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: SECRET_MASK.to_owned(),
            client_secret_set: !self.client_secret.is_empty(),
            updated_at: self.updated_at,
        }
    }
}

/// Non-secret view of the active credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub controller_url: String,
    pub tenant_id: String,
    pub client_id: String,
    /// Always [`SECRET_MASK`].
    pub client_secret: String,
    pub client_secret_set: bool,
    pub updated_at: DateTime<Utc>,
}

/// Storage adapter for the single active credential record.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Result<Option<Credential>, ControllerError>;
    async fn put(&self, credential: &Credential) -> Result<(), ControllerError>;
}

/// Replace every occurrence of each non-empty secret in `text`.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_owned();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = out.replace(secret, REDACTED);
    }
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
