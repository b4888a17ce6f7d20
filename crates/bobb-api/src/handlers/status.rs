//! /v1/status handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use bobb_core::{MandatoryHeader, OptionalHeader};

use super::ApiState;
use crate::error::{success, Envelope};
use crate::headers::RequiredHeaders;

#[derive(Serialize)]
pub struct StatusResponse {
    pub name: String,
    pub function: String,
    pub public_key: String,
    pub request: RequestInfo,
}

/// The caller's headers, decoded.
#[derive(Serialize)]
pub struct RequestInfo {
    pub version: String,
    pub message_type: u8,
    pub source: String,
    pub dest: String,
    pub sequence_number: u32,
    pub timestamp: u32,
    pub hop_count: u8,
    pub priority: u8,
    pub encryption_algo: bobb_core::EncryptionAlgo,
}

impl RequestInfo {
    fn new(header: &MandatoryHeader, optional: &OptionalHeader) -> Self {
        Self {
            version: format!("{}.{}", header.version_major(), header.version_minor()),
            message_type: header.message_type(),
            source: header.source().to_string(),
            dest: header.dest().to_string(),
            sequence_number: header.sequence_number(),
            timestamp: header.timestamp(),
            hop_count: optional.hop_count(),
            priority: optional.priority(),
            encryption_algo: optional.encryption_algo(),
        }
    }
}

pub async fn handle_status(
    State(state): State<ApiState>,
    headers: RequiredHeaders,
) -> Json<Envelope<StatusResponse>> {
    tracing::debug!(
        source = %headers.header.source(),
        sequence = headers.header.sequence_number(),
        "status request"
    );
    success(StatusResponse {
        name: state.name.clone(),
        function: state.function.clone(),
        public_key: state.public_key.to_hex(),
        request: RequestInfo::new(&headers.header, &headers.optional),
    })
}
