// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Credential, CredentialStore, CredentialSummary};
use crate::controller::ControllerError;

/// Process-wide credential handle.
///
/// Loaded once at startup and reloaded after every admin update. The token
/// cache reads the credential from here instead of querying the store.
pub struct CredentialHandle {
    store: Arc<dyn CredentialStore>,
    current: RwLock<Option<Credential>>,
}

impl CredentialHandle {
    /// Load the active record from `store`. A missing record is not an error.
    pub async fn load(store: Arc<dyn CredentialStore>) -> Result<Arc<Self>, ControllerError> {
        let current = store.get().await?;
        match current {
            Some(ref c) => tracing::info!(
                controller_url = %c.controller_url,
                tenant_id = %c.tenant_id,
                "controller credential loaded"
            ),
            None => tracing::warn!("no controller credential configured"),
        }
        Ok(Arc::new(Self { store, current: RwLock::new(current) }))
    }

    /// Re-read the record from the store.
    pub async fn reload(&self) -> Result<(), ControllerError> {
        let fresh = self.store.get().await?;
        *self.current.write().await = fresh;
        tracing::info!("controller credential reloaded");
        Ok(())
    }

    /// The active credential, validated. Fails with a credential error when
    /// absent or incomplete so no API call is attempted.
    pub async fn current(&self) -> Result<Credential, ControllerError> {
        let credential = self.current.read().await.clone().ok_or_else(|| {
            ControllerError::Credential("no controller credential configured".to_owned())
        })?;
        credential.validate()?;
        Ok(credential)
    }

    /// Validate, persist and reload a new credential.
    pub async fn update(&self, credential: Credential) -> Result<CredentialSummary, ControllerError> {
        let credential = credential.normalized();
        credential.validate()?;
        self.store.put(&credential).await?;
        self.reload().await?;
        Ok(credential.summary())
    }

    pub async fn summary(&self) -> Option<CredentialSummary> {
        self.current.read().await.as_ref().map(Credential::summary)
    }

    pub async fn is_configured(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Secret of the active credential, for redacting surfaced detail.
    pub async fn secret(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|c| c.client_secret.clone())
    }
}
