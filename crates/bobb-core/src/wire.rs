//! Bobb wire format — the packet headers carried by every message.
//!
//! These types ARE the protocol. Every field, every size and every byte
//! order is part of the wire format. Two independent implementations must
//! agree byte-for-byte, so the layout is fixed-width, big-endian and has no
//! padding or version-dependent variation.
//!
//! The on-wire structs derive zerocopy traits and are built only from
//! byte-aligned fields (`u8`, arrays, and big-endian integer wrappers), so
//! their `#[repr(C)]` layout cannot contain padding. There is no unsafe code
//! in this module.
//!
//! At the transport boundary both headers travel as lowercase hex strings in
//! the `X-Bobb-Header` and `X-Bobb-Optional-Header` fields.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Transport field carrying the hex-encoded mandatory header.
pub const X_BOBB_HEADER: &str = "x-bobb-header";

/// Transport field carrying the hex-encoded optional header.
pub const X_BOBB_OPTIONAL_HEADER: &str = "x-bobb-optional-header";

/// Encoded size of the mandatory header.
pub const HEADER_LEN: usize = 47;

/// Encoded size of the optional header.
pub const OPTIONAL_HEADER_LEN: usize = 7;

/// Current protocol version.
pub const VERSION_MAJOR: u8 = 0x01;
pub const VERSION_MINOR: u8 = 0x00;

/// Message type used for outbound requests.
pub const MESSAGE_TYPE_REQUEST: u8 = 0x01;

/// Message type stamped on responses.
pub const MESSAGE_TYPE_RESPONSE: u8 = 0x02;

// ── Mandatory Header (wire) ──────────────────────────────────────────────────

/// On-wire layout of the mandatory header.
///
/// Wire size: 47 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
struct MandatoryHeaderWire {
    version_major: u8,
    version_minor: u8,
    message_type: u8,
    source_address: [u8; 16],
    source_port: U16<BigEndian>,
    dest_address: [u8; 16],
    dest_port: U16<BigEndian>,
    sequence_number: U32<BigEndian>,
    /// Unix seconds.
    timestamp: U32<BigEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(MandatoryHeaderWire, [u8; HEADER_LEN]);

// ── Optional Header (wire) ───────────────────────────────────────────────────

/// On-wire layout of the optional header.
///
/// Wire size: 7 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
struct OptionalHeaderWire {
    timestamp: U32<BigEndian>,
    hop_count: u8,
    priority: u8,
    encryption_algo: u8,
}

assert_eq_size!(OptionalHeaderWire, [u8; OPTIONAL_HEADER_LEN]);

// ── Mandatory Header ─────────────────────────────────────────────────────────

/// Routing, sequencing and typing metadata attached to every message.
///
/// Immutable once built. Construct with [`MandatoryHeader::new`] from typed
/// values, with `TryFrom<HeaderFields>` from untyped request input, or with
/// [`MandatoryHeader::decode`] from wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MandatoryHeader {
    version_major: u8,
    version_minor: u8,
    message_type: u8,
    source_address: Ipv6Addr,
    source_port: u16,
    dest_address: Ipv6Addr,
    dest_port: u16,
    sequence_number: u32,
    timestamp: u32,
}

impl MandatoryHeader {
    /// Build a header from typed values.
    ///
    /// `version` is `(major, minor)`. Flow info and scope ID of the socket
    /// addresses are not part of the wire format and are discarded.
    pub fn new(
        version: (u8, u8),
        message_type: u8,
        source: SocketAddrV6,
        dest: SocketAddrV6,
        sequence_number: u32,
        timestamp: u32,
    ) -> Self {
        Self {
            version_major: version.0,
            version_minor: version.1,
            message_type,
            source_address: *source.ip(),
            source_port: source.port(),
            dest_address: *dest.ip(),
            dest_port: dest.port(),
            sequence_number,
            timestamp,
        }
    }

    pub fn version_major(&self) -> u8 {
        self.version_major
    }

    pub fn version_minor(&self) -> u8 {
        self.version_minor
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn source(&self) -> SocketAddrV6 {
        SocketAddrV6::new(self.source_address, self.source_port, 0, 0)
    }

    pub fn dest(&self) -> SocketAddrV6 {
        SocketAddrV6::new(self.dest_address, self.dest_port, 0, 0)
    }

    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Encode to the fixed 47-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        MandatoryHeaderWire {
            version_major: self.version_major,
            version_minor: self.version_minor,
            message_type: self.message_type,
            source_address: self.source_address.octets(),
            source_port: U16::new(self.source_port),
            dest_address: self.dest_address.octets(),
            dest_port: U16::new(self.dest_port),
            sequence_number: U32::new(self.sequence_number),
            timestamp: U32::new(self.timestamp),
        }
        .as_bytes()
        .to_vec()
    }

    /// Decode from wire bytes. The input must be exactly [`HEADER_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes, HEADER_LEN)?;
        let wire = MandatoryHeaderWire::read_from(bytes).ok_or(WireError::TooShort {
            expected: HEADER_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self {
            version_major: wire.version_major,
            version_minor: wire.version_minor,
            message_type: wire.message_type,
            source_address: Ipv6Addr::from(wire.source_address),
            source_port: wire.source_port.get(),
            dest_address: Ipv6Addr::from(wire.dest_address),
            dest_port: wire.dest_port.get(),
            sequence_number: wire.sequence_number.get(),
            timestamp: wire.timestamp.get(),
        })
    }

    /// Lowercase hex of the wire form, as carried in `X-Bobb-Header`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(s: &str) -> Result<Self, WireError> {
        let bytes = hex::decode(s.trim()).map_err(|e| WireError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

/// Untyped mandatory header input, e.g. the `necessary_header` object of a
/// create-header request. Every field is required; widths are checked by
/// `MandatoryHeader::try_from`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderFields {
    pub version_major: Option<u64>,
    pub version_minor: Option<u64>,
    pub message_type: Option<u64>,
    pub source_ipv6: Option<String>,
    pub source_port: Option<u64>,
    pub dest_ipv6: Option<String>,
    pub dest_port: Option<u64>,
    pub sequence_number: Option<u64>,
    pub timestamp: Option<u64>,
}

impl TryFrom<HeaderFields> for MandatoryHeader {
    type Error = WireError;

    fn try_from(f: HeaderFields) -> Result<Self, Self::Error> {
        Ok(Self {
            version_major: narrow("version_major", f.version_major)?,
            version_minor: narrow("version_minor", f.version_minor)?,
            message_type: narrow("message_type", f.message_type)?,
            source_address: address("source_ipv6", f.source_ipv6)?,
            source_port: narrow("source_port", f.source_port)?,
            dest_address: address("dest_ipv6", f.dest_ipv6)?,
            dest_port: narrow("dest_port", f.dest_port)?,
            sequence_number: narrow("sequence_number", f.sequence_number)?,
            timestamp: narrow("timestamp", f.timestamp)?,
        })
    }
}

// ── Optional Header ──────────────────────────────────────────────────────────

/// Cipher suite hint carried in the optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionAlgo {
    #[serde(rename = "NONE")]
    None = 0x00,
    #[serde(rename = "AES256GCM", alias = "AES256")]
    Aes256Gcm = 0x01,
    #[serde(rename = "CHACHA20POLY1305")]
    ChaCha20Poly1305 = 0x02,
}

impl TryFrom<u8> for EncryptionAlgo {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(EncryptionAlgo::None),
            0x01 => Ok(EncryptionAlgo::Aes256Gcm),
            0x02 => Ok(EncryptionAlgo::ChaCha20Poly1305),
            other => Err(WireError::UnknownEncryptionAlgo(format!("0x{other:02x}"))),
        }
    }
}

impl From<EncryptionAlgo> for u8 {
    fn from(a: EncryptionAlgo) -> u8 {
        a as u8
    }
}

impl FromStr for EncryptionAlgo {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['-', '_'], "").as_str() {
            "NONE" => Ok(EncryptionAlgo::None),
            "AES256GCM" | "AES256" => Ok(EncryptionAlgo::Aes256Gcm),
            "CHACHA20POLY1305" => Ok(EncryptionAlgo::ChaCha20Poly1305),
            _ => Err(WireError::UnknownEncryptionAlgo(s.to_string())),
        }
    }
}

/// Secondary header carrying QoS and crypto hints.
///
/// Its absence at the transport boundary is valid. If present it must fully
/// parse: every decode failure is reported as
/// [`WireError::OptionalHeaderInvalid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionalHeader {
    timestamp: u32,
    hop_count: u8,
    priority: u8,
    encryption_algo: EncryptionAlgo,
}

impl OptionalHeader {
    pub fn new(timestamp: u32, hop_count: u8, priority: u8, encryption_algo: EncryptionAlgo) -> Self {
        Self {
            timestamp,
            hop_count,
            priority,
            encryption_algo,
        }
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn hop_count(&self) -> u8 {
        self.hop_count
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn encryption_algo(&self) -> EncryptionAlgo {
        self.encryption_algo
    }

    /// Encode to the fixed 7-byte wire form.
    pub fn encode(&self) -> Vec<u8> {
        OptionalHeaderWire {
            timestamp: U32::new(self.timestamp),
            hop_count: self.hop_count,
            priority: self.priority,
            encryption_algo: self.encryption_algo.into(),
        }
        .as_bytes()
        .to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Self::decode_inner(bytes).map_err(WireError::optional)
    }

    fn decode_inner(bytes: &[u8]) -> Result<Self, WireError> {
        check_len(bytes, OPTIONAL_HEADER_LEN)?;
        let wire = OptionalHeaderWire::read_from(bytes).ok_or(WireError::TooShort {
            expected: OPTIONAL_HEADER_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self {
            timestamp: wire.timestamp.get(),
            hop_count: wire.hop_count,
            priority: wire.priority,
            encryption_algo: EncryptionAlgo::try_from(wire.encryption_algo)?,
        })
    }

    /// Lowercase hex of the wire form, as carried in `X-Bobb-Optional-Header`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(s: &str) -> Result<Self, WireError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| WireError::optional(WireError::InvalidHex(e.to_string())))?;
        Self::decode(&bytes)
    }
}

/// Untyped optional header input. `timestamp` may be left out by callers
/// that copy it from the mandatory header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionalHeaderFields {
    pub timestamp: Option<u64>,
    pub hop_count: Option<u64>,
    pub priority: Option<u64>,
    pub encryption_algo: Option<String>,
}

impl TryFrom<OptionalHeaderFields> for OptionalHeader {
    type Error = WireError;

    fn try_from(f: OptionalHeaderFields) -> Result<Self, Self::Error> {
        let algo = f
            .encryption_algo
            .ok_or(WireError::MissingField("encryption_algo"))?;
        Ok(Self {
            timestamp: narrow("timestamp", f.timestamp)?,
            hop_count: narrow("hop_count", f.hop_count)?,
            priority: narrow("priority", f.priority)?,
            encryption_algo: algo.parse()?,
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn check_len(bytes: &[u8], expected: usize) -> Result<(), WireError> {
    if bytes.len() < expected {
        return Err(WireError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(WireError::TrailingBytes {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Require a field and narrow it to its declared width.
fn narrow<T>(field: &'static str, value: Option<u64>) -> Result<T, WireError>
where
    T: TryFrom<u64> + Bounded,
{
    let value = value.ok_or(WireError::MissingField(field))?;
    T::try_from(value).map_err(|_| WireError::FieldOutOfRange {
        field,
        value,
        max: T::MAX_U64,
    })
}

fn address(field: &'static str, value: Option<String>) -> Result<Ipv6Addr, WireError> {
    let value = value.ok_or(WireError::MissingField(field))?;
    value
        .trim()
        .parse()
        .map_err(|_| WireError::InvalidAddress { field, value })
}

/// Largest value of an unsigned header field, for error reporting.
trait Bounded {
    const MAX_U64: u64;
}

impl Bounded for u8 {
    const MAX_U64: u64 = u8::MAX as u64;
}

impl Bounded for u16 {
    const MAX_U64: u64 = u16::MAX as u64;
}

impl Bounded for u32 {
    const MAX_U64: u64 = u32::MAX as u64;
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when building or interpreting header data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("header too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("header has trailing bytes: expected {expected} bytes, got {actual}")]
    TrailingBytes { expected: usize, actual: usize },

    #[error("header is not valid hex: {0}")]
    InvalidHex(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} value {value} exceeds maximum {max}")]
    FieldOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("field {field} is not a valid IPv6 address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("unknown encryption algorithm: {0}")]
    UnknownEncryptionAlgo(String),

    #[error("invalid optional header: {0}")]
    OptionalHeaderInvalid(Box<WireError>),
}

impl WireError {
    fn optional(inner: WireError) -> WireError {
        match inner {
            already @ WireError::OptionalHeaderInvalid(_) => already,
            other => WireError::OptionalHeaderInvalid(Box::new(other)),
        }
    }

    /// Stable error code reported at the transport boundary.
    pub fn code(&self) -> &'static str {
        match self {
            WireError::MissingField(_) => "MISSING_FIELD",
            WireError::FieldOutOfRange { .. } => "HEADER_FIELD_OUT_OF_RANGE",
            WireError::OptionalHeaderInvalid(_) | WireError::UnknownEncryptionAlgo(_) => {
                "INVALID_OPTIONAL_HEADER"
            }
            WireError::TooShort { .. }
            | WireError::TrailingBytes { .. }
            | WireError::InvalidHex(_)
            | WireError::InvalidAddress { .. } => "INVALID_BOBB_HEADER",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
