//! Transfer errors.

use std::path::PathBuf;

use bobb_core::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The chunk_id sequence has a gap; the id is the first one absent.
    #[error("chunk {0} is missing")]
    MissingChunk(u32),

    #[error("chunk {0} appears more than once")]
    DuplicateChunk(u32),

    /// A chunk id at or beyond the manifest's chunk count.
    #[error("chunk {0} is outside the payload's chunk range")]
    UnexpectedChunk(u32),

    #[error("payload needs more than {} chunks", u32::MAX)]
    TooManyChunks,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("malformed chunk file {path}: {reason}")]
    MalformedChunkFile { path: PathBuf, reason: String },

    #[error("malformed manifest {path}: {reason}")]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("reassembled payload does not match manifest: {0}")]
    ManifestMismatch(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("chunk worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error code. Authentication failures keep the cipher's code so
    /// callers can tell corrupted data apart from an incomplete transfer.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::MissingChunk(_) => "MISSING_CHUNK",
            TransferError::DuplicateChunk(_)
            | TransferError::UnexpectedChunk(_)
            | TransferError::MalformedChunkFile { .. }
            | TransferError::MalformedManifest { .. } => "MALFORMED_TRANSFER",
            TransferError::ManifestMismatch(_) => "MANIFEST_MISMATCH",
            TransferError::TooManyChunks | TransferError::InvalidChunkSize => "INVALID_CHUNKING",
            TransferError::Crypto(e) => e.code(),
            TransferError::Io { .. } => "IO_ERROR",
            TransferError::Worker(_) => "INTERNAL",
        }
    }

    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, TransferError::Crypto(CryptoError::AuthenticationFailure))
    }
}
