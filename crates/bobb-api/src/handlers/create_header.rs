//! /v1/create-header — build hex header values from JSON fields.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::{Deserialize, Serialize};

use bobb_core::wire::{HeaderFields, OptionalHeaderFields};
use bobb_core::{MandatoryHeader, OptionalHeader, WireError};

use crate::error::{success, ApiError, Envelope, INVALID_REQUEST_BODY};

#[derive(Debug, Deserialize)]
pub struct CreateHeaderRequest {
    pub necessary_header: Option<HeaderFields>,
    pub optional_header: Option<OptionalHeaderFields>,
}

#[derive(Debug, Serialize)]
pub struct CreateHeaderResponse {
    #[serde(rename = "X-Bobb-Header")]
    pub header: String,
    #[serde(rename = "X-Bobb-Optional-Header")]
    pub optional_header: String,
}

pub async fn handle_create_header(
    body: Result<Json<CreateHeaderRequest>, JsonRejection>,
) -> Result<Json<Envelope<CreateHeaderResponse>>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(INVALID_REQUEST_BODY, e.body_text()))?;
    let (header, optional) = build_headers(req)?;
    Ok(success(CreateHeaderResponse {
        header: header.to_hex(),
        optional_header: optional.to_hex(),
    }))
}

/// Validate both field sets. The optional header's timestamp defaults to
/// the mandatory header's.
pub fn build_headers(
    req: CreateHeaderRequest,
) -> Result<(MandatoryHeader, OptionalHeader), WireError> {
    let fields = req
        .necessary_header
        .ok_or(WireError::MissingField("necessary_header"))?;
    let header = MandatoryHeader::try_from(fields)?;

    let mut optional_fields = req
        .optional_header
        .ok_or(WireError::MissingField("optional_header"))?;
    optional_fields
        .timestamp
        .get_or_insert(u64::from(header.timestamp()));
    let optional = OptionalHeader::try_from(optional_fields)?;

    Ok((header, optional))
}
