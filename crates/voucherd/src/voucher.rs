// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand voucher issuance.
//!
//! A create whose outcome is unknown marks the site unresolved. The next
//! create for that site first lists and mirrors the site's vouchers so the
//! earlier attempt is accounted for before anything new is submitted.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::controller::{units, Controller, ControllerError, ErrorKind};
use crate::model::{PlanSpec, Voucher};
use crate::store::Mirror;
use crate::sync::SyncScheduler;

pub struct VoucherIssuer {
    controller: Arc<Controller>,
    mirror: Arc<dyn Mirror>,
    scheduler: Arc<SyncScheduler>,
    currency: String,
    unresolved: Mutex<HashSet<String>>,
}

impl VoucherIssuer {
    pub fn new(
        controller: Arc<Controller>,
        mirror: Arc<dyn Mirror>,
        scheduler: Arc<SyncScheduler>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            mirror,
            scheduler,
            currency: currency.into(),
            unresolved: Mutex::new(HashSet::new()),
        }
    }

    pub async fn create(&self, site_id: &str, plan: &PlanSpec) -> Result<Voucher, ControllerError> {
        let request = units::voucher_group_request(plan, &self.currency)?;
        self.reconcile_if_unresolved(site_id).await?;

        let mut record = match self.controller.create_voucher(site_id, &request).await {
            Ok(record) => record,
            Err(e) => {
                self.on_create_failed(site_id, &e).await;
                return Err(e);
            }
        };
        record.plan_id = Some(plan.plan_id.clone());
        self.mirror.upsert_vouchers(site_id, std::slice::from_ref(&record)).await?;
        tracing::info!(site_id, plan_id = %plan.plan_id, voucher_id = %record.remote_voucher_id, "voucher issued");

        self.mirror.voucher(&record.remote_voucher_id).await?.ok_or_else(|| {
            ControllerError::Storage(format!("voucher {} missing after upsert", record.remote_voucher_id))
        })
    }

    /// Sites with an unresolved ambiguous create.
    pub async fn unresolved_sites(&self) -> Vec<String> {
        let mut sites: Vec<_> = self.unresolved.lock().await.iter().cloned().collect();
        sites.sort();
        sites
    }

    async fn reconcile_if_unresolved(&self, site_id: &str) -> Result<(), ControllerError> {
        if !self.unresolved.lock().await.contains(site_id) {
            return Ok(());
        }
        tracing::info!(site_id, "reconciling ambiguous voucher create before issuing");
        let vouchers = self.controller.list_vouchers(site_id).await?;
        let count = self.mirror.upsert_vouchers(site_id, &vouchers).await?;
        self.unresolved.lock().await.remove(site_id);
        tracing::info!(site_id, vouchers = count, "ambiguous create reconciled");
        Ok(())
    }

    async fn on_create_failed(&self, site_id: &str, err: &ControllerError) {
        match err.kind() {
            ErrorKind::AmbiguousOutcome => {
                tracing::warn!(site_id, err = %err, "voucher create outcome unknown, site needs reconciliation");
                self.unresolved.lock().await.insert(site_id.to_owned());
            }
            ErrorKind::NotFound => {
                tracing::warn!(site_id, "site missing on controller, starting targeted re-sync");
                let scheduler = Arc::clone(&self.scheduler);
                let site_id = site_id.to_owned();
                tokio::spawn(async move {
                    match scheduler.resync_site(&site_id).await {
                        Ok(outcome) => tracing::info!(site_id, ?outcome, "targeted re-sync finished"),
                        Err(e) => tracing::warn!(site_id, err = %e, "targeted re-sync failed"),
                    }
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "voucher_tests.rs"]
mod tests;
