// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy shared by the token cache, the controller client and the
//! sync scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Machine-readable classification of a [`ControllerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Client id/secret/tenant rejected, or access token refused.
    #[serde(rename = "CREDENTIAL_ERROR")]
    Credential,
    /// Network failure, timeout or 5xx.
    #[serde(rename = "TRANSIENT_ERROR")]
    Transient,
    /// Controller asked us to slow down.
    RateLimited,
    /// Malformed request; never retried.
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Referenced site or voucher no longer exists remotely.
    NotFound,
    /// A non-idempotent write may or may not have been applied.
    AmbiguousOutcome,
    /// Local storage adapter failure.
    #[serde(rename = "STORAGE_ERROR")]
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credential => "CREDENTIAL_ERROR",
            Self::Transient => "TRANSIENT_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AmbiguousOutcome => "AMBIGUOUS_OUTCOME",
            Self::Storage => "STORAGE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Credential => 502,
            Self::Transient => 503,
            Self::RateLimited => 429,
            Self::Validation => 422,
            Self::NotFound => 404,
            Self::AmbiguousOutcome => 504,
            Self::Storage => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a controller interaction.
///
/// `Clone` so one refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("{0}")]
    Credential(String),
    #[error("{0}")]
    Transient(String),
    #[error("rate limited by controller, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AmbiguousOutcome(String),
    #[error("{0}")]
    Storage(String),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Credential(_) => ErrorKind::Credential,
            Self::Transient(_) => ErrorKind::Transient,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AmbiguousOutcome(_) => ErrorKind::AmbiguousOutcome,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the calling layer may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential(_))
    }
}

impl From<sqlx::Error> for ControllerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ControllerError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(format!("migration failed: {e}"))
    }
}
