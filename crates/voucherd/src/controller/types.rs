// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes of the controller OpenAPI and its error-code table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ControllerError;

/// Every controller response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub error_code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    #[serde(rename = "omadacId")]
    pub omadac_id: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResult {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub current_page: u64,
    #[serde(default)]
    pub current_size: u64,
    #[serde(default)]
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSite {
    pub site_id: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVoucher {
    pub id: String,
    pub code: String,
    /// 0 unused, 1 in use, 2 expired.
    #[serde(default)]
    pub status: i64,
    /// Epoch milliseconds.
    #[serde(default)]
    pub create_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedGroup {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoucherStatistics {
    pub total_count: u64,
    pub unused_count: u64,
    pub in_use_count: u64,
    pub expired_count: u64,
    /// Minor currency units.
    pub total_amount: i64,
    pub currency: Option<String>,
}

/// Body of `POST .../hotspot/voucher-groups`. Built only by `units`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherGroupRequest {
    pub name: String,
    pub description: String,
    pub amount: u32,
    pub code_length: u8,
    pub code_form: Vec<u8>,
    pub limit_type: u8,
    pub limit_num: u32,
    pub duration_type: u8,
    /// Minutes.
    pub duration: u32,
    pub timing_type: u8,
    pub rate_limit: RateLimit,
    pub traffic_limit_enable: bool,
    /// Megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit: Option<u64>,
    /// Minor currency units.
    pub unit_price: i64,
    pub currency: String,
    pub apply_to_all_portals: bool,
    pub portals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub mode: u8,
    pub custom_rate_limit: CustomRateLimit,
}

/// Kilobits per second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRateLimit {
    pub down_limit_enable: bool,
    pub down_limit: u64,
    pub up_limit_enable: bool,
    pub up_limit: u64,
}

/// Map a non-zero envelope `errorCode` onto the taxonomy.
pub fn classify_code(
    code: i64,
    msg: Option<&str>,
    what: &str,
    rate_limit_default: Duration,
) -> ControllerError {
    let detail = msg.filter(|m| !m.is_empty()).unwrap_or("no message");
    match code {
        -44106 | -44111 | -44116 => ControllerError::Credential(format!(
            "invalid credentials: controller rejected the client id, secret or tenant id \
             (errorCode {code}: {detail})"
        )),
        -44112 | -44113 => ControllerError::Credential(format!(
            "access token expired or invalid (errorCode {code}: {detail})"
        )),
        -33000 | -33004 => {
            ControllerError::NotFound(format!("{what}: site not found (errorCode {code}: {detail})"))
        }
        -1001 => ControllerError::Validation(format!(
            "{what}: invalid parameters (errorCode {code}: {detail})"
        )),
        -1201 => ControllerError::RateLimited { retry_after: rate_limit_default },
        -1 => ControllerError::Transient(format!(
            "{what}: controller general failure (errorCode {code}: {detail})"
        )),
        _ => ControllerError::Validation(format!("{what}: errorCode {code}: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ErrorKind;

    #[test]
    fn credential_codes_say_invalid_credentials() -> anyhow::Result<()> {
        for code in [-44106, -44111, -44116] {
            let err = classify_code(code, Some("Invalid client"), "authorize", Duration::ZERO);
            assert_eq!(err.kind(), ErrorKind::Credential);
            assert!(err.to_string().starts_with("invalid credentials"), "{err}");
        }
        Ok(())
    }

    #[test]
    fn code_table_covers_taxonomy() -> anyhow::Result<()> {
        let wait = Duration::from_secs(7);
        let cases = [
            (-44112, ErrorKind::Credential),
            (-33004, ErrorKind::NotFound),
            (-1001, ErrorKind::Validation),
            (-1201, ErrorKind::RateLimited),
            (-1, ErrorKind::Transient),
            (-99999, ErrorKind::Validation),
        ];
        for (code, kind) in cases {
            assert_eq!(classify_code(code, None, "op", wait).kind(), kind, "code {code}");
        }
        assert_eq!(
            classify_code(-1201, None, "op", wait),
            ControllerError::RateLimited { retry_after: wait }
        );
        Ok(())
    }

    #[test]
    fn envelope_parses_without_result() -> anyhow::Result<()> {
        let env: Envelope<CreatedGroup> =
            serde_json::from_str(r#"{"errorCode":-44116,"msg":"Invalid client credentials."}"#)?;
        assert_eq!(env.error_code, -44116);
        assert!(env.result.is_none());
        Ok(())
    }

    #[test]
    fn page_decodes_items_without_default() -> anyhow::Result<()> {
        let page: Page<RemoteVoucher> = serde_json::from_str(
            r#"{"totalRows":2,"currentPage":1,"data":[{"id":"v1","code":"111"},{"id":"v2","code":"222","status":1}]}"#,
        )?;
        assert_eq!(page.total_rows, 2);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[1].status, 1);

        let empty: Page<RemoteVoucher> = serde_json::from_str("{}")?;
        assert!(empty.data.is_empty());
        Ok(())
    }
}
