//! Header encode/inspect commands.

use anyhow::{Context, Result};
use serde::Deserialize;

use bobb_core::wire::{HeaderFields, OptionalHeaderFields, HEADER_LEN, OPTIONAL_HEADER_LEN};
use bobb_core::{MandatoryHeader, OptionalHeader};

/// Same shape as the body of `POST /v1/create-header`.
#[derive(Deserialize)]
struct HeaderRequest {
    necessary_header: HeaderFields,
    optional_header: Option<OptionalHeaderFields>,
}

/// Encode headers from a JSON document and print them as hex, one per line.
pub fn cmd_encode(json: &str) -> Result<()> {
    let request: HeaderRequest = serde_json::from_str(json).context("invalid header JSON")?;
    let header = MandatoryHeader::try_from(request.necessary_header)?;
    println!("X-Bobb-Header: {}", header.to_hex());

    if let Some(mut fields) = request.optional_header {
        fields
            .timestamp
            .get_or_insert(u64::from(header.timestamp()));
        let optional = OptionalHeader::try_from(fields)?;
        println!("X-Bobb-Optional-Header: {}", optional.to_hex());
    }
    Ok(())
}

/// Decode one or two hex values. The length tells which header each one is.
pub fn cmd_inspect(values: &[&str]) -> Result<()> {
    for value in values {
        let value = value.trim();
        match value.len() / 2 {
            OPTIONAL_HEADER_LEN => print_optional(&OptionalHeader::from_hex(value)?),
            _ => print_header(
                &MandatoryHeader::from_hex(value)
                    .with_context(|| format!("expected a {HEADER_LEN}-byte header"))?,
            ),
        }
    }
    Ok(())
}

fn print_header(h: &MandatoryHeader) {
    println!("┌─ X-Bobb-Header");
    println!("│  version  : {}.{}", h.version_major(), h.version_minor());
    println!("│  type     : {}", h.message_type());
    println!("│  source   : {}", h.source());
    println!("│  dest     : {}", h.dest());
    println!("│  sequence : {}", h.sequence_number());
    println!("└─ time     : {}", h.timestamp());
}

fn print_optional(o: &OptionalHeader) {
    println!("┌─ X-Bobb-Optional-Header");
    println!("│  time     : {}", o.timestamp());
    println!("│  hops     : {}", o.hop_count());
    println!("│  priority : {}", o.priority());
    println!("└─ algo     : {:?}", o.encryption_algo());
}
