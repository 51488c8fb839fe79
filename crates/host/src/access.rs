//! Per-request access gate.
//!
//! Loopback remote, origin allow-list, and a constant-time shared-secret
//! check. This gate is the only thing standing between a local web page and
//! the user's shell, so every filesystem endpoint and both terminal
//! endpoints pass through it. Method mismatches are answered with 405 by the
//! per-route method routers before any of this runs.

use std::net::IpAddr;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use url::Url;

const TOKEN_HEADER: &str = "x-omt-token";

/// Denial produced by the gate; renders as a plaintext status response.
#[derive(Debug)]
pub struct AccessDenied {
    status: StatusCode,
    message: String,
}

impl AccessDenied {
    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Process-lifetime access policy: the shared secret plus the fixed origin
/// allow-list.
pub struct AccessPolicy {
    token: String,
}

impl AccessPolicy {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Run the gate for one request. Checks short-circuit in order:
    /// loopback remote (403), allowed origin (403), token (401).
    pub fn require_access(
        &self,
        remote: IpAddr,
        headers: &HeaderMap,
        query_token: Option<&str>,
        operation: &str,
    ) -> Result<(), AccessDenied> {
        if !remote.is_loopback() {
            return Err(AccessDenied::forbidden(format!(
                "{operation} only allows loopback clients"
            )));
        }

        let origin = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !is_allowed_origin(origin) {
            tracing::warn!(origin, operation, "rejected request from disallowed origin");
            return Err(AccessDenied::forbidden("forbidden origin"));
        }

        if !self.token_matches(headers, query_token) {
            return Err(AccessDenied {
                status: StatusCode::UNAUTHORIZED,
                message: "unauthorized".to_string(),
            });
        }

        Ok(())
    }

    /// Empty configured secret disables token auth. The comparison never
    /// early-returns on length; `subtle` keeps it constant-time.
    fn token_matches(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        if self.token.is_empty() {
            return true;
        }

        let header_token = headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty());
        let provided = header_token.or_else(|| {
            query_token.map(str::trim).filter(|token| !token.is_empty())
        });

        match provided {
            Some(token) => token.as_bytes().ct_eq(self.token.as_bytes()).into(),
            None => false,
        }
    }
}

/// Origins a local desktop renderer can legitimately present: none at all,
/// the literal `null` (file:// and sandboxed pages), any `file:` URL, or a
/// loopback hostname. Parsed strictly so `localhost.evil.com` cannot slip
/// through a substring check.
pub fn is_allowed_origin(origin: &str) -> bool {
    let trimmed = origin.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return true;
    }

    let Ok(parsed) = Url::parse(trimmed) else {
        return false;
    };
    if parsed.scheme().eq_ignore_ascii_case("file") {
        return true;
    }

    let host = parsed
        .host_str()
        .unwrap_or("")
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    matches!(host.as_str(), "localhost" | "127.0.0.1" | "::1")
}
