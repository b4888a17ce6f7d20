//! CLI command modules.

pub mod header;
pub mod keys;
pub mod transfer;

/// First 16 hex characters, for compact display of keys.
pub(crate) fn short(hex: &str) -> &str {
    &hex[..hex.len().min(16)]
}
