// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the controller OpenAPI.
//!
//! Every method takes the credential (base URL and tenant) plus an access
//! token and returns canonical values or a classified [`ControllerError`].

use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{
    classify_code, CreatedGroup, Envelope, Page, RemoteSite, RemoteVoucher, TokenRequest,
    TokenResult, VoucherGroupRequest, VoucherStatistics,
};
use super::{units, ControllerError};
use crate::credential::Credential;
use crate::model::{SiteRecord, UsageSummary, VoucherRecord};
use crate::token::{TokenGrant, TokenSource};

const PAGE_SIZE: u32 = 100;
const MAX_PAGES: u32 = 1000;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring provider for rustls once per process.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub struct ApiClient {
    http: Client,
    rate_limit_default: Duration,
    default_currency: String,
}

impl ApiClient {
    pub fn new(
        request_timeout: Duration,
        connect_timeout: Duration,
        rate_limit_default: Duration,
        default_currency: impl Into<String>,
    ) -> Result<Self, ControllerError> {
        ensure_crypto();
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ControllerError::Transient(format!("http client init failed: {e}")))?;
        Ok(Self { http, rate_limit_default, default_currency: default_currency.into() })
    }

    fn api_url(credential: &Credential, path: &str) -> String {
        format!("{}/openapi/v1/{}{}", credential.controller_url, credential.tenant_id, path)
    }

    /// Client-credentials exchange. The only call without a bearer header.
    pub async fn authorize(&self, credential: &Credential) -> Result<TokenGrant, ControllerError> {
        let body = TokenRequest {
            omadac_id: &credential.tenant_id,
            client_id: &credential.client_id,
            client_secret: &credential.client_secret,
        };
        let req = self
            .http
            .post(format!("{}/openapi/authorize/token", credential.controller_url))
            .query(&[("grant_type", "client_credentials")])
            .json(&body);
        let result: TokenResult = self.fetch(req, "authorize").await?;
        let expires_in = u64::try_from(result.expires_in).unwrap_or(0);
        tracing::debug!(
            token_type = result.token_type.as_deref().unwrap_or("bearer"),
            expires_in,
            "token exchange succeeded"
        );
        Ok(TokenGrant { access_token: result.access_token, expires_in: Duration::from_secs(expires_in) })
    }

    pub async fn list_sites(
        &self,
        credential: &Credential,
        token: &str,
    ) -> Result<Vec<SiteRecord>, ControllerError> {
        let url = Self::api_url(credential, "/sites");
        let sites: Vec<RemoteSite> = self.fetch_all(&url, token, "list sites").await?;
        Ok(sites.into_iter().map(units::site_from_wire).collect())
    }

    pub async fn list_vouchers(
        &self,
        credential: &Credential,
        token: &str,
        site_id: &str,
    ) -> Result<Vec<VoucherRecord>, ControllerError> {
        let url = Self::api_url(credential, &format!("/sites/{site_id}/hotspot/vouchers"));
        let vouchers: Vec<RemoteVoucher> = self.fetch_all(&url, token, "list vouchers").await?;
        let mut records = Vec::with_capacity(vouchers.len());
        for voucher in vouchers {
            let (id, status) = (voucher.id.clone(), voucher.status);
            match units::voucher_from_wire(voucher) {
                Some(record) => records.push(record),
                None => tracing::warn!(site_id, voucher_id = %id, status, "skipping voucher with unknown status"),
            }
        }
        Ok(records)
    }

    /// Issue one voucher. Never retried here: any failure after the request
    /// may have reached the controller is reported as `AmbiguousOutcome`.
    pub async fn create_voucher(
        &self,
        credential: &Credential,
        token: &str,
        site_id: &str,
        request: &VoucherGroupRequest,
    ) -> Result<VoucherRecord, ControllerError> {
        let url = Self::api_url(credential, &format!("/sites/{site_id}/hotspot/voucher-groups"));
        let resp = match self.http.post(&url).bearer_auth(token).json(request).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_connect() => {
                return Err(ControllerError::Transient(format!("create voucher: connect failed: {e}")))
            }
            Err(e) => {
                return Err(ControllerError::AmbiguousOutcome(format!(
                    "create voucher on site {site_id}: outcome unknown: {e}"
                )))
            }
        };
        if resp.status().is_server_error() {
            return Err(ControllerError::AmbiguousOutcome(format!(
                "create voucher on site {site_id}: controller returned {}",
                resp.status()
            )));
        }
        let created: CreatedGroup = self.decode(resp, "create voucher").await.map_err(|e| match e {
            ControllerError::Transient(msg) => ControllerError::AmbiguousOutcome(format!(
                "create voucher on site {site_id}: outcome unknown: {msg}"
            )),
            other => other,
        })?;

        // The group exists from here on; failing to read it back is ambiguous.
        let group_url = Self::api_url(
            credential,
            &format!("/sites/{site_id}/hotspot/voucher-groups/{}", created.id),
        );
        let req = self.http.get(&group_url).bearer_auth(token).query(&[("page", 1), ("pageSize", 1)]);
        let page: Page<RemoteVoucher> = self.fetch(req, "read voucher group").await.map_err(|e| {
            ControllerError::AmbiguousOutcome(format!(
                "voucher group {} created on site {site_id} but could not be read back: {e}",
                created.id
            ))
        })?;
        page.data.into_iter().find_map(units::voucher_from_wire).ok_or_else(|| {
            ControllerError::AmbiguousOutcome(format!(
                "voucher group {} created on site {site_id} but contains no voucher",
                created.id
            ))
        })
    }

    pub async fn usage_summary(
        &self,
        credential: &Credential,
        token: &str,
        site_id: &str,
    ) -> Result<UsageSummary, ControllerError> {
        let url = Self::api_url(credential, &format!("/sites/{site_id}/hotspot/vouchers/statistics"));
        let stats: VoucherStatistics =
            self.fetch(self.http.get(&url).bearer_auth(token), "usage summary").await?;
        units::usage_from_wire(stats, &self.default_currency)
    }

    /// Cheapest authenticated read: one site.
    pub async fn test_connectivity(
        &self,
        credential: &Credential,
        token: &str,
    ) -> Result<(), ControllerError> {
        let url = Self::api_url(credential, "/sites");
        let req = self.http.get(&url).bearer_auth(token).query(&[("page", 1), ("pageSize", 1)]);
        let _: Page<serde_json::Value> = self.fetch(req, "connectivity check").await?;
        Ok(())
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        what: &str,
    ) -> Result<Vec<T>, ControllerError> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let req = self.http.get(url).bearer_auth(token).query(&[("page", page), ("pageSize", PAGE_SIZE)]);
            let chunk: Page<T> = self.fetch(req, what).await?;
            let received = chunk.data.len();
            items.extend(chunk.data);
            if received == 0 || items.len() as u64 >= chunk.total_rows {
                return Ok(items);
            }
        }
        tracing::warn!(what, pages = MAX_PAGES, "pagination limit reached");
        Ok(items)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<T, ControllerError> {
        let resp = req.send().await.map_err(|e| transport_error(&e, what))?;
        self.decode(resp, what).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        resp: Response,
        what: &str,
    ) -> Result<T, ControllerError> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(self.rate_limit_default);
            tracing::warn!(what, retry_after_secs = retry_after.as_secs(), "controller rate limited request");
            return Err(ControllerError::RateLimited { retry_after });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ControllerError::Transient(format!("{what}: reading response failed: {e}")))?;

        if !status.is_success() {
            // Some controller errors carry an envelope code even on 4xx.
            if let Ok(envelope) = serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
                if envelope.error_code != 0 && !status.is_server_error() {
                    return Err(classify_code(
                        envelope.error_code,
                        envelope.msg.as_deref(),
                        what,
                        self.rate_limit_default,
                    ));
                }
            }
            return Err(classify_status(status, what));
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| ControllerError::Transient(format!("{what}: malformed response: {e}")))?;
        if envelope.error_code != 0 {
            let err = classify_code(envelope.error_code, envelope.msg.as_deref(), what, self.rate_limit_default);
            tracing::debug!(what, code = envelope.error_code, kind = %err.kind(), "controller returned error code");
            return Err(err);
        }
        envelope
            .result
            .ok_or_else(|| ControllerError::Transient(format!("{what}: response has no result")))
    }
}

#[async_trait::async_trait]
impl TokenSource for ApiClient {
    async fn exchange(&self, credential: &Credential) -> Result<TokenGrant, ControllerError> {
        self.authorize(credential).await
    }
}

fn transport_error(e: &reqwest::Error, what: &str) -> ControllerError {
    if e.is_timeout() {
        ControllerError::Transient(format!("{what}: request timed out"))
    } else if e.is_connect() {
        ControllerError::Transient(format!("{what}: connect failed: {e}"))
    } else {
        ControllerError::Transient(format!("{what}: request failed: {e}"))
    }
}

pub(crate) fn classify_status(status: StatusCode, what: &str) -> ControllerError {
    match status.as_u16() {
        401 | 403 => ControllerError::Credential(format!("{what}: controller refused access ({status})")),
        404 => ControllerError::NotFound(format!("{what}: not found ({status})")),
        400 | 422 => ControllerError::Validation(format!("{what}: rejected request ({status})")),
        s if s >= 500 => ControllerError::Transient(format!("{what}: controller error ({status})")),
        _ => ControllerError::Validation(format!("{what}: unexpected status {status}")),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
