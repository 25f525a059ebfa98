// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::controller::{ControllerError, ErrorKind};

/// Error codes for the voucherd API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    /// A classified controller or storage failure.
    Controller(ErrorKind),
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Controller(kind) => kind.http_status(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Controller(kind) => kind.as_str(),
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self::Controller(kind)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a controller failure. `message` must already be redacted.
/// Rate-limited failures carry a `Retry-After` header.
pub fn controller_error_response(err: &ControllerError, message: impl Into<String>) -> Response {
    let mut resp = ApiError::from(err.kind()).to_http_response(message).into_response();
    if let ControllerError::RateLimited { retry_after } = err {
        let secs = retry_after.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            resp.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    resp
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn controller_kinds_keep_their_codes() {
        let err = ApiError::from(ErrorKind::AmbiguousOutcome);
        assert_eq!(err.as_str(), "AMBIGUOUS_OUTCOME");
        assert_eq!(err.http_status(), 504);
        assert_eq!(ApiError::from(ErrorKind::Credential).as_str(), "CREDENTIAL_ERROR");
    }

    #[test]
    fn rate_limited_response_sets_retry_after() {
        let err = ControllerError::RateLimited { retry_after: Duration::from_secs(7) };
        let resp = controller_error_response(&err, err.to_string());
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            resp.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("7")
        );
    }
}
