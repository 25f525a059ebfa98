// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single place where canonical values meet provider-native units.
//!
//! Canonical: money is a `Decimal` with two fractional digits, durations are
//! minutes, rate limits kbps, data limits MB. Wire: `unitPrice` is an integer
//! count of minor currency units, timestamps are epoch milliseconds.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::types::{
    CustomRateLimit, RateLimit, RemoteSite, RemoteVoucher, VoucherGroupRequest, VoucherStatistics,
};
use super::ControllerError;
use crate::model::{PlanSpec, SiteRecord, UsageSummary, VoucherRecord, VoucherStatus};

pub const PRICE_SCALE: u32 = 2;
const CODE_LENGTH: u8 = 8;

/// `12.50` becomes `1250`.
pub fn price_to_wire(price: Decimal) -> Result<i64, ControllerError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ControllerError::Validation(format!("price must not be negative: {price}")));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ControllerError::Validation(format!(
            "price has more than {PRICE_SCALE} fractional digits: {price}"
        )));
    }
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.trunc().to_i64())
        .ok_or_else(|| ControllerError::Validation(format!("price out of range: {price}")))
}

/// `1250` becomes `12.50`.
pub fn price_from_wire(minor_units: i64) -> Decimal {
    Decimal::new(minor_units, PRICE_SCALE)
}

/// ISO 4217 alphabetic code, upper-cased.
pub fn currency_code(code: &str) -> Result<String, ControllerError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ControllerError::Validation(format!("invalid currency code: {code:?}")));
    }
    Ok(code)
}

pub fn timestamp_from_wire(epoch_ms: Option<i64>) -> DateTime<Utc> {
    epoch_ms.and_then(DateTime::<Utc>::from_timestamp_millis).unwrap_or_else(Utc::now)
}

pub fn voucher_status_from_wire(status: i64) -> Option<VoucherStatus> {
    match status {
        0 => Some(VoucherStatus::Active),
        1 => Some(VoucherStatus::Used),
        2 => Some(VoucherStatus::Expired),
        _ => None,
    }
}

/// Build the create body for `plan`. Pure: no request is made on failure.
pub fn voucher_group_request(
    plan: &PlanSpec,
    default_currency: &str,
) -> Result<VoucherGroupRequest, ControllerError> {
    if plan.plan_id.trim().is_empty() {
        return Err(ControllerError::Validation("plan_id must not be empty".to_owned()));
    }
    if plan.duration_minutes == 0 {
        return Err(ControllerError::Validation("duration_minutes must be positive".to_owned()));
    }
    if plan.max_users == 0 {
        return Err(ControllerError::Validation("max_users must be positive".to_owned()));
    }
    if plan.data_limit_mb == Some(0) {
        return Err(ControllerError::Validation("data_limit_mb must be positive when set".to_owned()));
    }
    let currency = currency_code(plan.currency.as_deref().unwrap_or(default_currency))?;
    let unit_price = price_to_wire(plan.price)?;

    let down = plan.download_kbps.filter(|v| *v > 0);
    let up = plan.upload_kbps.filter(|v| *v > 0);
    Ok(VoucherGroupRequest {
        name: plan.name.clone().unwrap_or_else(|| format!("plan {}", plan.plan_id)),
        description: format!("plan:{}", plan.plan_id),
        amount: 1,
        code_length: CODE_LENGTH,
        code_form: vec![0],
        limit_type: 0,
        limit_num: plan.max_users,
        duration_type: 0,
        duration: plan.duration_minutes,
        timing_type: 0,
        rate_limit: RateLimit {
            mode: 0,
            custom_rate_limit: CustomRateLimit {
                down_limit_enable: down.is_some(),
                down_limit: down.unwrap_or(0),
                up_limit_enable: up.is_some(),
                up_limit: up.unwrap_or(0),
            },
        },
        traffic_limit_enable: plan.data_limit_mb.is_some(),
        traffic_limit: plan.data_limit_mb,
        unit_price,
        currency,
        apply_to_all_portals: true,
        portals: Vec::new(),
    })
}

pub fn site_from_wire(site: RemoteSite) -> SiteRecord {
    let location = site.address.filter(|a| !a.is_empty()).or(site.region.filter(|r| !r.is_empty()));
    SiteRecord { remote_site_id: site.site_id, name: site.name, location }
}

/// `None` when the controller reports a status we do not model.
pub fn voucher_from_wire(voucher: RemoteVoucher) -> Option<VoucherRecord> {
    let status = voucher_status_from_wire(voucher.status)?;
    Some(VoucherRecord {
        remote_voucher_id: voucher.id,
        plan_id: None,
        code: voucher.code,
        status,
        created_at: timestamp_from_wire(voucher.create_time),
    })
}

pub fn usage_from_wire(
    stats: VoucherStatistics,
    default_currency: &str,
) -> Result<UsageSummary, ControllerError> {
    let currency = currency_code(stats.currency.as_deref().unwrap_or(default_currency))?;
    Ok(UsageSummary {
        total_vouchers: stats.total_count,
        active_vouchers: stats.unused_count,
        used_vouchers: stats.in_use_count,
        expired_vouchers: stats.expired_count,
        revenue: price_from_wire(stats.total_amount),
        currency,
    })
}

#[cfg(test)]
#[path = "units_tests.rs"]
mod tests;
