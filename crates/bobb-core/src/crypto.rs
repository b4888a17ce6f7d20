//! Cryptographic primitives for Bobb.
//!
//! Provides three things:
//!   1. Key agreement: X25519 ECDH followed by HKDF-SHA256, producing the
//!      256-bit SharedKey both peers compute independently
//!   2. Chunk cipher: AES-256-GCM over one opaque block, fresh 96-bit nonce
//!      per call, no associated data
//!   3. BLAKE3 hashing: payload digests and key fingerprints
//!
//! Keypairs are managed via x25519-dalek for explicit key control. Key
//! material is validated when it is parsed (PKCS#8 / SPKI DER), so a
//! `Keypair` or `PeerPublicKey` value is always an X25519 key.
//!
//! All secret material derives ZeroizeOnDrop and is wiped when dropped.
//! There is no unsafe code in this module.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// HKDF info label. Both peers must use the same label or their keys differ.
const HKDF_INFO: &[u8] = b"handshake data";

/// AES-GCM nonce size in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

/// SharedKey size in bytes.
pub const KEY_LEN: usize = 32;

/// PKCS#8 v1 prefix of an X25519 private key (OID 1.3.101.110).
/// Followed by the 32 raw private key bytes.
const PKCS8_X25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x04, 0x22, 0x04, 0x20,
];

/// PKCS#8 v2 (OneAsymmetricKey) prefix of an X25519 private key. Followed by
/// the 32 private key bytes, then [`PKCS8_V2_PUBLIC_TAG`] and the 32 public
/// key bytes.
const PKCS8_V2_X25519_PREFIX: [u8; 16] = [
    0x30, 0x51, 0x02, 0x01, 0x01, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x04, 0x22, 0x04, 0x20,
];

/// `[1] IMPLICIT BIT STRING`, 33 bytes, no unused bits.
const PKCS8_V2_PUBLIC_TAG: [u8; 3] = [0x81, 0x21, 0x00];

/// SubjectPublicKeyInfo prefix of an X25519 public key.
/// Followed by the 32 raw public key bytes.
const SPKI_X25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x03, 0x21, 0x00,
];

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A node's long-term X25519 keypair. Used for key agreement only, never
/// for signing.
///
/// One keypair per node identity, loaded once per session. The private key
/// never leaves this struct except through [`Keypair::to_pkcs8_der`], which
/// exists for the key store.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Private key — zeroized on drop, never exposed directly.
    private: Zeroizing<[u8; 32]>,
    /// Public key — freely shareable.
    pub public: [u8; 32],
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    /// Parse an unencrypted PKCS#8 private key. Rejects anything that is not
    /// an X25519 key.
    ///
    /// Accepts the v1 form and the v2 form carrying the public key, as long
    /// as the embedded public key matches the private one. Containers with
    /// attributes are not supported.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Some(raw) = strip_prefix(der, &PKCS8_X25519_PREFIX) {
            return Ok(Self::from_raw_private(raw));
        }
        if let Some(rest) = der.strip_prefix(&PKCS8_V2_X25519_PREFIX[..]) {
            if rest.len() == 32 + PKCS8_V2_PUBLIC_TAG.len() + 32 {
                let (raw, tail) = rest.split_at(32);
                if let Some(public) = tail.strip_prefix(&PKCS8_V2_PUBLIC_TAG[..]) {
                    let keypair = Self::from_raw_private(raw);
                    if keypair.public[..] != *public {
                        return Err(CryptoError::InvalidKeyType(
                            "X25519 (public key does not match private key)".to_string(),
                        ));
                    }
                    return Ok(keypair);
                }
            }
        }
        Err(CryptoError::InvalidKeyType(describe_algorithm(der).to_string()))
    }

    fn from_raw_private(raw: &[u8]) -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(raw);
        Self::from_private(*bytes)
    }

    /// Serialize the private key as PKCS#8 DER for persistent storage.
    pub fn to_pkcs8_der(&self) -> Zeroizing<Vec<u8>> {
        let mut der = Zeroizing::new(Vec::with_capacity(PKCS8_X25519_PREFIX.len() + 32));
        der.extend_from_slice(&PKCS8_X25519_PREFIX);
        der.extend_from_slice(&*self.private);
        der
    }

    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey(self.public)
    }

}

/// A peer's X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerPublicKey([u8; 32]);

impl PeerPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a SubjectPublicKeyInfo public key. Rejects anything that is not
    /// an X25519 key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let raw = strip_prefix(der, &SPKI_X25519_PREFIX)
            .ok_or_else(|| CryptoError::InvalidKeyType(describe_algorithm(der).to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(raw);
        Ok(Self(bytes))
    }

    pub fn to_spki_der(&self) -> Vec<u8> {
        let mut der = Vec::with_capacity(SPKI_X25519_PREFIX.len() + 32);
        der.extend_from_slice(&SPKI_X25519_PREFIX);
        der.extend_from_slice(&self.0);
        der
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn strip_prefix<'a>(der: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if der.len() != prefix.len() + 32 {
        return None;
    }
    der.strip_prefix(prefix)
}

/// Best-effort name of the algorithm in a DER key container, for errors.
fn describe_algorithm(der: &[u8]) -> &'static str {
    const KNOWN: [(&[u8], &str); 6] = [
        (&[0x06, 0x03, 0x2b, 0x65, 0x6e], "X25519 (malformed container)"),
        (&[0x06, 0x03, 0x2b, 0x65, 0x70], "Ed25519"),
        (&[0x06, 0x03, 0x2b, 0x65, 0x6f], "X448"),
        (&[0x06, 0x03, 0x2b, 0x65, 0x71], "Ed448"),
        (
            &[0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01],
            "EC",
        ),
        (
            &[0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01],
            "RSA",
        ),
    ];
    KNOWN
        .iter()
        .find(|(oid, _)| der.windows(oid.len()).any(|w| w == *oid))
        .map(|(_, name)| *name)
        .unwrap_or("unrecognised key")
}

// ── Shared Key ───────────────────────────────────────────────────────────────

/// 256-bit symmetric key shared by exactly one (local keypair, peer) pairing.
///
/// Whoever holds it can decrypt every chunk encrypted under it. Never
/// persisted; recompute it per session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_LEN]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Random key, for callers that do not need key agreement.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short BLAKE3 fingerprint — safe to log, lets two peers confirm
    /// they derived the same key.
    pub fn fingerprint(&self) -> String {
        hex::encode(&hash(&self.0)[..8])
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SharedKey {}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedKey").field(&self.fingerprint()).finish()
    }
}

// ── Key Agreement ────────────────────────────────────────────────────────────

/// Derive the SharedKey for `local` talking to `peer`.
///
///   key = HKDF-SHA256(salt = none, ikm = X25519(local, peer), info = "handshake data")
///
/// Symmetric: `derive(A, B.pub) == derive(B, A.pub)`.
pub fn derive_shared_key(local: &Keypair, peer: &PeerPublicKey) -> Result<SharedKey, CryptoError> {
    let secret = StaticSecret::from(*local.private);
    let shared = secret.diffie_hellman(&PublicKey::from(peer.0));
    if !shared.was_contributory() {
        return Err(CryptoError::WeakPublicKey);
    }

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; KEY_LEN];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(SharedKey(okm))
}

// ── Chunk Cipher ─────────────────────────────────────────────────────────────

/// One encrypted block: the nonce it was sealed under and the ciphertext
/// with the 16-byte tag appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedChunk {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Generate a cryptographically random 96-bit nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a block under a fresh random nonce.
pub fn seal(key: &SharedKey, plaintext: &[u8]) -> Result<SealedChunk, CryptoError> {
    seal_with_nonce(key, generate_nonce(), plaintext)
}

/// Encrypt a block under a caller-chosen nonce.
///
/// The caller must guarantee the nonce is never reused under `key`.
pub fn seal_with_nonce(
    key: &SharedKey,
    nonce: [u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<SealedChunk, CryptoError> {
    let ciphertext = cipher(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;
    Ok(SealedChunk { nonce, ciphertext })
}

/// Decrypt and authenticate a block.
///
/// Returns `AuthenticationFailure` if the ciphertext, tag or nonce were
/// altered or truncated, or if `key` is not the key it was sealed under.
pub fn open(
    key: &SharedKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::AuthenticationFailure);
    }
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Encrypt a whole message into a single blob: `nonce(12) || ciphertext || tag(16)`.
pub fn seal_message(key: &SharedKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let sealed = seal(key, data)?;
    let mut out = Vec::with_capacity(NONCE_LEN + sealed.ciphertext.len());
    out.extend_from_slice(&sealed.nonce);
    out.extend_from_slice(&sealed.ciphertext);
    Ok(out)
}

/// Inverse of [`seal_message`]. A blob too short to hold a nonce is
/// `TooShort`; anything after the nonce is up to [`open`].
pub fn open_message(key: &SharedKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::TooShort);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let mut n = [0u8; NONCE_LEN];
    n.copy_from_slice(nonce);
    open(key, &n, ciphertext)
}

fn cipher(key: &SharedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("expected an X25519 key, found {0}")]
    InvalidKeyType(String),

    #[error("authentication failed: ciphertext, nonce or key do not match")]
    AuthenticationFailure,

    #[error("peer public key is a low-order point")]
    WeakPublicKey,

    #[error("message too short (need at least {NONCE_LEN} nonce bytes)")]
    TooShort,

    #[error("HKDF expansion failed")]
    KeyDerivation,

    #[error("AES-GCM encryption failed")]
    Encryption,
}

impl CryptoError {
    /// Stable error code, distinguishing corrupted data from the wrong key
    /// type from malformed input.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidKeyType(_) => "INVALID_KEY_TYPE",
            CryptoError::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            CryptoError::WeakPublicKey => "WEAK_PUBLIC_KEY",
            CryptoError::TooShort => "MESSAGE_TOO_SHORT",
            CryptoError::KeyDerivation | CryptoError::Encryption => "CRYPTO_INTERNAL",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
