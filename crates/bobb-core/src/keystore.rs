//! Key store — provisioning and loading of per-identity X25519 keys.
//!
//! Layout:
//!   <key_dir>/<identity>_private_key.pem   PKCS#8 "PRIVATE KEY", mode 0600
//!   <key_dir>/<identity>_public_key.pem    SPKI "PUBLIC KEY"
//!
//! Readers validate that both the PEM label and the algorithm inside the
//! container are X25519 and reject anything else.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::crypto::{self, CryptoError, Keypair, PeerPublicKey, SharedKey};

const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";
const PUBLIC_KEY_TAG: &str = "PUBLIC KEY";

/// Directory of PEM key files, one pair per identity.
#[derive(Debug, Clone)]
pub struct KeyStore {
    key_dir: PathBuf,
}

impl KeyStore {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    pub fn private_key_path(&self, identity: &str) -> PathBuf {
        self.key_dir.join(format!("{identity}_private_key.pem"))
    }

    pub fn public_key_path(&self, identity: &str) -> PathBuf {
        self.key_dir.join(format!("{identity}_public_key.pem"))
    }

    /// True if both key files exist for `identity`.
    pub fn exists(&self, identity: &str) -> bool {
        self.private_key_path(identity).exists() && self.public_key_path(identity).exists()
    }

    /// Generate a fresh keypair for `identity` and persist it, replacing any
    /// existing files.
    pub fn generate(&self, identity: &str) -> Result<Keypair, KeyStoreError> {
        let keypair = Keypair::generate();
        self.save(identity, &keypair)?;
        Ok(keypair)
    }

    /// Persist `keypair` under `identity`.
    pub fn save(&self, identity: &str, keypair: &Keypair) -> Result<(), KeyStoreError> {
        validate_identity(identity)?;
        std::fs::create_dir_all(&self.key_dir).map_err(|e| KeyStoreError::Io {
            path: self.key_dir.clone(),
            source: e,
        })?;

        let private_pem = pem::encode(&pem::Pem::new(
            PRIVATE_KEY_TAG,
            keypair.to_pkcs8_der().to_vec(),
        ));
        write_private(&self.private_key_path(identity), private_pem.as_bytes())?;

        let public_pem = pem::encode(&pem::Pem::new(
            PUBLIC_KEY_TAG,
            keypair.public_key().to_spki_der(),
        ));
        let public_path = self.public_key_path(identity);
        std::fs::write(&public_path, public_pem).map_err(|e| KeyStoreError::Io {
            path: public_path,
            source: e,
        })?;
        Ok(())
    }

    pub fn load_keypair(&self, identity: &str) -> Result<Keypair, KeyStoreError> {
        validate_identity(identity)?;
        read_private_key(&self.private_key_path(identity))
    }

    pub fn load_public_key(&self, identity: &str) -> Result<PeerPublicKey, KeyStoreError> {
        validate_identity(identity)?;
        read_public_key(&self.public_key_path(identity))
    }

    /// Load the keypair for `identity`, provisioning one on first use.
    pub fn load_or_generate(&self, identity: &str) -> Result<Keypair, KeyStoreError> {
        if self.private_key_path(identity).exists() {
            self.load_keypair(identity)
        } else {
            self.generate(identity)
        }
    }

    /// Load `local`'s private key and `peer`'s public key and derive the
    /// key they share.
    pub fn derive_shared_key(&self, local: &str, peer: &str) -> Result<SharedKey, KeyStoreError> {
        let keypair = self.load_keypair(local)?;
        let peer_public = self.load_public_key(peer)?;
        Ok(crypto::derive_shared_key(&keypair, &peer_public)?)
    }
}

/// Read an X25519 private key from a PEM file.
pub fn read_private_key(path: &Path) -> Result<Keypair, KeyStoreError> {
    let der = read_pem(path, PRIVATE_KEY_TAG)?;
    Ok(Keypair::from_pkcs8_der(&der)?)
}

/// Read an X25519 public key from a PEM file.
pub fn read_public_key(path: &Path) -> Result<PeerPublicKey, KeyStoreError> {
    let der = read_pem(path, PUBLIC_KEY_TAG)?;
    Ok(PeerPublicKey::from_spki_der(&der)?)
}

fn read_pem(path: &Path, expected_tag: &str) -> Result<Vec<u8>, KeyStoreError> {
    let text = std::fs::read(path).map_err(|e| KeyStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let block = pem::parse(&text).map_err(|e| KeyStoreError::Pem {
        path: path.to_path_buf(),
        source: e,
    })?;
    if block.tag() != expected_tag {
        return Err(KeyStoreError::Crypto(CryptoError::InvalidKeyType(format!(
            "PEM block {:?}",
            block.tag()
        ))));
    }
    Ok(block.contents().to_vec())
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), KeyStoreError> {
    let io_err = |e| KeyStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)
}

/// Identity names become file name prefixes.
fn validate_identity(identity: &str) -> Result<(), KeyStoreError> {
    let valid = !identity.is_empty()
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !identity.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(KeyStoreError::InvalidIdentity(identity.to_string()))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse PEM in {path}: {source}")]
    Pem {
        path: PathBuf,
        source: pem::PemError,
    },

    #[error("invalid identity name: {0:?}")]
    InvalidIdentity(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
