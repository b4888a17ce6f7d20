//! Response envelope shared by every route.
//!
//! `{"status": "success"|"error", "data": ..., "status_code": n}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use bobb_core::WireError;

pub const INVALID_BOBB_HEADER: &str = "INVALID_BOBB_HEADER";
pub const INVALID_OPTIONAL_HEADER: &str = "INVALID_OPTIONAL_HEADER";
pub const INVALID_REQUEST_BODY: &str = "INVALID_REQUEST_BODY";

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
    pub status_code: u16,
}

/// 200 with `data` wrapped in the success envelope.
pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data,
        status_code: StatusCode::OK.as_u16(),
    })
}

/// An error answered with the error envelope.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(code: &'static str, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            details: Some(details.into()),
        }
    }

    /// A header that failed to parse. Optional-header failures keep their
    /// own code whatever the underlying cause.
    pub fn from_header(err: &WireError, optional: bool) -> Self {
        let code = if optional {
            INVALID_OPTIONAL_HEADER
        } else {
            INVALID_BOBB_HEADER
        };
        Self::bad_request(code, err.to_string())
    }
}

impl From<WireError> for ApiError {
    fn from(err: WireError) -> Self {
        Self::bad_request(err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut data = json!({ "error": self.code });
        if let Some(details) = self.details {
            data["details"] = details.into();
        }
        let body = Envelope {
            status: "error",
            data,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}
