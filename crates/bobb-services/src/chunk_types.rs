//! Chunk types — the atomic unit of an encrypted transfer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use bobb_core::crypto::NONCE_LEN;

use crate::error::TransferError;

/// One independently encrypted slice of a payload.
///
/// `chunk_id` is the 0-based ordinal of the plaintext block; it is the only
/// thing reassembly orders by. `ciphertext` includes the 16-byte tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: u32,
    #[serde(with = "hex_nonce")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "hex_bytes")]
    pub ciphertext: Bytes,
}

impl Chunk {
    /// Chunk-store file body: `nonce(12) || ciphertext`.
    pub fn to_file_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a chunk-store file body. Only the nonce length is checked here;
    /// authenticity is the cipher's job.
    pub fn from_file_bytes(chunk_id: u32, data: &[u8]) -> Result<Self, String> {
        if data.len() < NONCE_LEN {
            return Err(format!(
                "{} bytes is shorter than the {NONCE_LEN}-byte nonce",
                data.len()
            ));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[..NONCE_LEN]);
        Ok(Self {
            chunk_id,
            nonce,
            ciphertext: Bytes::copy_from_slice(&data[NONCE_LEN..]),
        })
    }
}

/// Per-payload metadata, stored next to the chunks as `manifest.json`.
///
/// `chunk_count` lets the receiver notice a missing final chunk, which the
/// chunk ids alone cannot reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    pub total_bytes: u64,
    pub chunk_count: u32,
    pub chunk_size: u64,
    /// BLAKE3 of the plaintext, hex.
    pub payload_hash: String,
}

impl TransferManifest {
    pub fn for_payload(payload: &[u8], chunk_size: usize, chunk_count: u32) -> Self {
        Self {
            total_bytes: payload.len() as u64,
            chunk_count,
            chunk_size: chunk_size as u64,
            payload_hash: hex::encode(bobb_core::crypto::hash(payload)),
        }
    }

    /// Check a reassembled payload against the manifest.
    pub fn verify(&self, payload: &[u8]) -> Result<(), TransferError> {
        if payload.len() as u64 != self.total_bytes {
            return Err(TransferError::ManifestMismatch(format!(
                "reassembled {} bytes, manifest says {}",
                payload.len(),
                self.total_bytes
            )));
        }
        if hex::encode(bobb_core::crypto::hash(payload)) != self.payload_hash {
            return Err(TransferError::ManifestMismatch(
                "payload digest does not match manifest".to_string(),
            ));
        }
        Ok(())
    }
}

/// The encrypted form of one logical payload: its manifest and its chunks,
/// ordered by `chunk_id` when produced by the pipeline.
///
/// Serializes to JSON as the in-memory transfer representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub manifest: TransferManifest,
    pub chunks: Vec<Chunk>,
}

mod hex_nonce {
    use super::NONCE_LEN;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nonce: &[u8; NONCE_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(nonce))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; NONCE_LEN], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom(format!("nonce must be {NONCE_LEN} bytes")))
    }
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(&text).map(Bytes::from).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_bytes_put_the_nonce_first() {
        let chunk = Chunk {
            chunk_id: 3,
            nonce: [0xaa; NONCE_LEN],
            ciphertext: Bytes::from_static(b"ciphertext-and-tag"),
        };
        let body = chunk.to_file_bytes();
        assert_eq!(&body[..NONCE_LEN], &[0xaa; NONCE_LEN]);
        assert_eq!(&body[NONCE_LEN..], b"ciphertext-and-tag");
        assert_eq!(Chunk::from_file_bytes(3, &body).unwrap(), chunk);
    }

    #[test]
    fn short_file_body_is_rejected() {
        assert!(Chunk::from_file_bytes(0, &[0u8; NONCE_LEN - 1]).is_err());
    }

    #[test]
    fn chunk_json_uses_hex_fields() {
        let chunk = Chunk {
            chunk_id: 1,
            nonce: [0x01; NONCE_LEN],
            ciphertext: Bytes::from_static(&[0xde, 0xad]),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["chunk_id"], 1);
        assert_eq!(json["nonce"], "010101010101010101010101");
        assert_eq!(json["ciphertext"], "dead");

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);

        let bad = serde_json::json!({"chunk_id": 1, "nonce": "0101", "ciphertext": ""});
        assert!(serde_json::from_value::<Chunk>(bad).is_err());
    }

    #[test]
    fn manifest_detects_size_and_digest_changes() {
        let manifest = TransferManifest::for_payload(b"hello world", 4, 3);
        assert!(manifest.verify(b"hello world").is_ok());
        assert!(manifest.verify(b"hello worl").is_err());
        assert!(manifest.verify(b"hello World").is_err());
    }
}
