//! Bobb header middleware.
//!
//! Inbound: `X-Bobb-Header` and `X-Bobb-Optional-Header` are parsed on every
//! request and stored as a [`RequestHeaders`] extension. Absent headers are
//! fine here; a header that is present but malformed ends the request with a
//! 400. Routes that need headers take [`RequiredHeaders`].
//!
//! Outbound: every response gets a freshly built header pair.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use bobb_core::wire::{
    self, EncryptionAlgo, MandatoryHeader, OptionalHeader, MESSAGE_TYPE_RESPONSE, VERSION_MAJOR,
    VERSION_MINOR,
};
use bobb_core::WireError;

use crate::error::{ApiError, INVALID_BOBB_HEADER, INVALID_OPTIONAL_HEADER};
use crate::handlers::ApiState;

/// Hop budget stamped on responses.
pub const RESPONSE_HOP_COUNT: u8 = 10;
/// Priority stamped on responses.
pub const RESPONSE_PRIORITY: u8 = 1;

/// Headers parsed from a request. Either may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeaders {
    pub header: Option<MandatoryHeader>,
    pub optional: Option<OptionalHeader>,
}

impl RequestHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Result<Self, ApiError> {
        let header = match headers.get(wire::X_BOBB_HEADER) {
            Some(value) => Some(
                header_text(value)
                    .and_then(MandatoryHeader::from_hex)
                    .map_err(|e| ApiError::from_header(&e, false))?,
            ),
            None => None,
        };
        let optional = match headers.get(wire::X_BOBB_OPTIONAL_HEADER) {
            Some(value) => Some(
                header_text(value)
                    .and_then(OptionalHeader::from_hex)
                    .map_err(|e| ApiError::from_header(&e, true))?,
            ),
            None => None,
        };
        Ok(Self { header, optional })
    }
}

fn header_text(value: &HeaderValue) -> Result<&str, WireError> {
    value
        .to_str()
        .map_err(|_| WireError::InvalidHex("header value is not ASCII".to_string()))
}

/// Parse inbound headers into a [`RequestHeaders`] extension.
pub async fn parse_request_headers(mut req: Request, next: Next) -> Response {
    match RequestHeaders::from_header_map(req.headers()) {
        Ok(parsed) => {
            req.extensions_mut().insert(parsed);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(code = err.code, details = ?err.details, "rejected request headers");
            err.into_response()
        }
    }
}

/// Stamp a response header pair on whatever the inner service answered,
/// rejections included. A reply goes back to the request's source when the
/// request carried a readable header.
pub async fn inject_response_headers(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Response {
    let reply_to = req
        .headers()
        .get(wire::X_BOBB_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| MandatoryHeader::from_hex(s).ok())
        .map(|h| h.source())
        .unwrap_or(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));

    let mut response = next.run(req).await;

    let (header, optional) = state.response_headers(reply_to);
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&header.to_hex()) {
        headers.insert(wire::X_BOBB_HEADER, v);
    }
    if let Ok(v) = HeaderValue::from_str(&optional.to_hex()) {
        headers.insert(wire::X_BOBB_OPTIONAL_HEADER, v);
    }
    response
}

impl ApiState {
    /// Next outbound header pair. Each call consumes a sequence number.
    pub fn response_headers(&self, dest: SocketAddrV6) -> (MandatoryHeader, OptionalHeader) {
        let timestamp = unix_now();
        let header = MandatoryHeader::new(
            (VERSION_MAJOR, VERSION_MINOR),
            MESSAGE_TYPE_RESPONSE,
            self.local,
            dest,
            self.next_sequence(),
            timestamp,
        );
        let optional = OptionalHeader::new(
            timestamp,
            RESPONSE_HOP_COUNT,
            RESPONSE_PRIORITY,
            EncryptionAlgo::Aes256Gcm,
        );
        (header, optional)
    }
}

/// Current time in unix seconds, saturating at the header's 32-bit range.
pub fn unix_now() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Both headers, present and valid. Rejects with the same 400 envelope the
/// middleware uses.
#[derive(Debug, Clone, Copy)]
pub struct RequiredHeaders {
    pub header: MandatoryHeader,
    pub optional: OptionalHeader,
}

impl<S> FromRequestParts<S> for RequiredHeaders
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let parsed = match parts.extensions.get::<RequestHeaders>() {
            Some(parsed) => *parsed,
            None => RequestHeaders::from_header_map(&parts.headers)?,
        };
        let header = parsed.header.ok_or_else(|| {
            ApiError::bad_request(INVALID_BOBB_HEADER, "missing X-Bobb-Header")
        })?;
        let optional = parsed.optional.ok_or_else(|| {
            ApiError::bad_request(INVALID_OPTIONAL_HEADER, "missing X-Bobb-Optional-Header")
        })?;
        Ok(Self { header, optional })
    }
}
