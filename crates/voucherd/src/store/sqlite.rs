// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed credential store and mirror.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::Mirror;
use crate::controller::ControllerError;
use crate::credential::{Credential, CredentialStore};
use crate::model::{Site, SiteRecord, SiteStatus, UsageSummary, Voucher, VoucherRecord, VoucherStatus};

/// Rank used so a batch never moves a voucher back to an earlier status.
const STATUS_RANK_NEW: &str =
    "CASE excluded.status WHEN 'expired' THEN 2 WHEN 'used' THEN 1 ELSE 0 END";
const STATUS_RANK_OLD: &str =
    "CASE vouchers.status WHEN 'expired' THEN 2 WHEN 'used' THEN 1 ELSE 0 END";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self, ControllerError> {
        tracing::debug!(url, "opening database");
        let pool = SqlitePoolOptions::new().max_connections(4).connect(url).await?;
        Self::migrate(pool).await
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self, ControllerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, ControllerError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("database initialized");
        Ok(Self { pool })
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn corrupt(what: &str, value: &str) -> ControllerError {
    ControllerError::Storage(format!("unexpected {what} in database: {value:?}"))
}

fn site_from_row(row: &SqliteRow) -> Result<Site, ControllerError> {
    let status: String = row.try_get("status")?;
    Ok(Site {
        id: row.try_get("id")?,
        remote_site_id: row.try_get("remote_site_id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        status: SiteStatus::parse(&status).ok_or_else(|| corrupt("site status", &status))?,
        last_synced_at: row.try_get("last_synced_at")?,
    })
}

fn voucher_from_row(row: &SqliteRow) -> Result<Voucher, ControllerError> {
    let status: String = row.try_get("status")?;
    Ok(Voucher {
        id: row.try_get("id")?,
        remote_voucher_id: row.try_get("remote_voucher_id")?,
        site_id: row.try_get("remote_site_id")?,
        plan_id: row.try_get("plan_id")?,
        code: row.try_get("code")?,
        status: VoucherStatus::parse(&status).ok_or_else(|| corrupt("voucher status", &status))?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait::async_trait]
impl CredentialStore for SqliteStore {
    async fn get(&self) -> Result<Option<Credential>, ControllerError> {
        let row = sqlx::query(
            "SELECT controller_url, tenant_id, client_id, client_secret, updated_at
             FROM controller_credentials WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<Credential, ControllerError> {
            Ok(Credential {
                controller_url: row.try_get("controller_url")?,
                tenant_id: row.try_get("tenant_id")?,
                client_id: row.try_get("client_id")?,
                client_secret: row.try_get("client_secret")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn put(&self, credential: &Credential) -> Result<(), ControllerError> {
        sqlx::query(
            "INSERT INTO controller_credentials
                 (id, controller_url, tenant_id, client_id, client_secret, updated_at)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 controller_url = excluded.controller_url,
                 tenant_id = excluded.tenant_id,
                 client_id = excluded.client_id,
                 client_secret = excluded.client_secret,
                 updated_at = excluded.updated_at",
        )
        .bind(&credential.controller_url)
        .bind(&credential.tenant_id)
        .bind(&credential.client_id)
        .bind(&credential.client_secret)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Mirror for SqliteStore {
    async fn upsert_sites(&self, sites: &[SiteRecord]) -> Result<u64, ControllerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for site in sites {
            sqlx::query(
                "INSERT INTO sites (remote_site_id, name, location, status, last_synced_at)
                 VALUES (?, ?, ?, 'active', ?)
                 ON CONFLICT(remote_site_id) DO UPDATE SET
                     name = excluded.name,
                     location = excluded.location,
                     status = 'active',
                     last_synced_at = excluded.last_synced_at",
            )
            .bind(&site.remote_site_id)
            .bind(&site.name)
            .bind(&site.location)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(sites.len() as u64)
    }

    async fn retire_missing_sites(&self, present: &[String]) -> Result<u64, ControllerError> {
        let present: HashSet<&str> = present.iter().map(String::as_str).collect();
        let mut tx = self.pool.begin().await?;
        let active: Vec<String> =
            sqlx::query_scalar("SELECT remote_site_id FROM sites WHERE status = 'active'")
                .fetch_all(&mut *tx)
                .await?;
        let mut retired = 0;
        for id in active.iter().filter(|id| !present.contains(id.as_str())) {
            sqlx::query("UPDATE sites SET status = 'missing' WHERE remote_site_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tracing::info!(site_id = %id, "site no longer reported by controller, marked missing");
            retired += 1;
        }
        tx.commit().await?;
        Ok(retired)
    }

    async fn retire_site(&self, remote_site_id: &str) -> Result<(), ControllerError> {
        sqlx::query("UPDATE sites SET status = 'missing' WHERE remote_site_id = ?")
            .bind(remote_site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_vouchers(
        &self,
        remote_site_id: &str,
        vouchers: &[VoucherRecord],
    ) -> Result<u64, ControllerError> {
        let sql = format!(
            "INSERT INTO vouchers
                 (remote_voucher_id, remote_site_id, plan_id, code, status, created_at, last_synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(remote_voucher_id) DO UPDATE SET
                 remote_site_id = excluded.remote_site_id,
                 plan_id = COALESCE(excluded.plan_id, vouchers.plan_id),
                 code = excluded.code,
                 status = CASE WHEN ({STATUS_RANK_NEW}) >= ({STATUS_RANK_OLD})
                               THEN excluded.status ELSE vouchers.status END,
                 last_synced_at = excluded.last_synced_at"
        );
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for voucher in vouchers {
            sqlx::query(&sql)
                .bind(&voucher.remote_voucher_id)
                .bind(remote_site_id)
                .bind(&voucher.plan_id)
                .bind(&voucher.code)
                .bind(voucher.status.as_str())
                .bind(voucher.created_at)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(vouchers.len() as u64)
    }

    async fn upsert_usage(
        &self,
        remote_site_id: &str,
        usage: &UsageSummary,
    ) -> Result<(), ControllerError> {
        sqlx::query(
            "INSERT INTO site_usage
                 (remote_site_id, total_vouchers, active_vouchers, used_vouchers,
                  expired_vouchers, revenue, currency, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(remote_site_id) DO UPDATE SET
                 total_vouchers = excluded.total_vouchers,
                 active_vouchers = excluded.active_vouchers,
                 used_vouchers = excluded.used_vouchers,
                 expired_vouchers = excluded.expired_vouchers,
                 revenue = excluded.revenue,
                 currency = excluded.currency,
                 updated_at = excluded.updated_at",
        )
        .bind(remote_site_id)
        .bind(to_i64(usage.total_vouchers))
        .bind(to_i64(usage.active_vouchers))
        .bind(to_i64(usage.used_vouchers))
        .bind(to_i64(usage.expired_vouchers))
        .bind(usage.revenue.to_string())
        .bind(&usage.currency)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sites(&self) -> Result<Vec<Site>, ControllerError> {
        let rows = sqlx::query(
            "SELECT id, remote_site_id, name, location, status, last_synced_at
             FROM sites ORDER BY name, remote_site_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(site_from_row).collect()
    }

    async fn list_vouchers(&self, remote_site_id: &str) -> Result<Vec<Voucher>, ControllerError> {
        let rows = sqlx::query(
            "SELECT id, remote_voucher_id, remote_site_id, plan_id, code, status, created_at
             FROM vouchers WHERE remote_site_id = ? ORDER BY created_at, id",
        )
        .bind(remote_site_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(voucher_from_row).collect()
    }

    async fn voucher(&self, remote_voucher_id: &str) -> Result<Option<Voucher>, ControllerError> {
        let row = sqlx::query(
            "SELECT id, remote_voucher_id, remote_site_id, plan_id, code, status, created_at
             FROM vouchers WHERE remote_voucher_id = ?",
        )
        .bind(remote_voucher_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(voucher_from_row).transpose()
    }

    async fn usage(&self, remote_site_id: &str) -> Result<Option<UsageSummary>, ControllerError> {
        let row = sqlx::query(
            "SELECT total_vouchers, active_vouchers, used_vouchers, expired_vouchers,
                    revenue, currency
             FROM site_usage WHERE remote_site_id = ?",
        )
        .bind(remote_site_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let revenue: String = row.try_get("revenue")?;
        Ok(Some(UsageSummary {
            total_vouchers: to_u64(row.try_get("total_vouchers")?),
            active_vouchers: to_u64(row.try_get("active_vouchers")?),
            used_vouchers: to_u64(row.try_get("used_vouchers")?),
            expired_vouchers: to_u64(row.try_get("expired_vouchers")?),
            revenue: Decimal::from_str(&revenue).map_err(|_| corrupt("revenue", &revenue))?,
            currency: row.try_get("currency")?,
        }))
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
