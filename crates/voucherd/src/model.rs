// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical site, voucher and usage shapes shared by the controller client,
//! the mirror and the HTTP surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Voucher lifecycle. Ordered: a mirrored voucher never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Active,
    Used,
    Expired,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "used" => Some(Self::Used),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Soft lifecycle of a mirrored site. Sites are never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Missing,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Missing => "missing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

/// A site as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub remote_site_id: String,
    pub name: String,
    pub location: Option<String>,
}

/// A voucher as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub remote_voucher_id: String,
    pub plan_id: Option<String>,
    pub code: String,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
}

/// Mirrored site row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub remote_site_id: String,
    pub name: String,
    pub location: Option<String>,
    pub status: SiteStatus,
    pub last_synced_at: DateTime<Utc>,
}

/// Mirrored voucher row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i64,
    pub remote_voucher_id: String,
    pub site_id: String,
    pub plan_id: Option<String>,
    pub code: String,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-site usage and sales counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_vouchers: u64,
    pub active_vouchers: u64,
    pub used_vouchers: u64,
    pub expired_vouchers: u64,
    pub revenue: Decimal,
    pub currency: String,
}

fn default_max_users() -> u32 {
    1
}

/// Caller-facing description of the voucher to issue, in canonical units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub plan_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Decimal with at most two fractional digits.
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub duration_minutes: u32,
    #[serde(default = "default_max_users")]
    pub max_users: u32,
    #[serde(default)]
    pub download_kbps: Option<u64>,
    #[serde(default)]
    pub upload_kbps: Option<u64>,
    #[serde(default)]
    pub data_limit_mb: Option<u64>,
}
