// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local persistence mirror of remote sites, vouchers and usage counters.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::controller::ControllerError;
use crate::model::{Site, SiteRecord, UsageSummary, Voucher, VoucherRecord};

/// Write-through mirror used by the sync scheduler and voucher issuance.
///
/// Every batch method applies all of its rows or none of them.
#[async_trait::async_trait]
pub trait Mirror: Send + Sync {
    /// Insert or refresh sites, marking them active again.
    async fn upsert_sites(&self, sites: &[SiteRecord]) -> Result<u64, ControllerError>;

    /// Soft-retire every active site whose remote id is not in `present`.
    async fn retire_missing_sites(&self, present: &[String]) -> Result<u64, ControllerError>;

    async fn retire_site(&self, remote_site_id: &str) -> Result<(), ControllerError>;

    /// Insert or refresh one site's voucher batch. Status never regresses and
    /// an existing plan id survives a record without one.
    async fn upsert_vouchers(
        &self,
        remote_site_id: &str,
        vouchers: &[VoucherRecord],
    ) -> Result<u64, ControllerError>;

    async fn upsert_usage(
        &self,
        remote_site_id: &str,
        usage: &UsageSummary,
    ) -> Result<(), ControllerError>;

    async fn list_sites(&self) -> Result<Vec<Site>, ControllerError>;

    async fn list_vouchers(&self, remote_site_id: &str) -> Result<Vec<Voucher>, ControllerError>;

    async fn voucher(&self, remote_voucher_id: &str) -> Result<Option<Voucher>, ControllerError>;

    async fn usage(&self, remote_site_id: &str) -> Result<Option<UsageSummary>, ControllerError>;
}
