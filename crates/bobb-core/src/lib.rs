//! bobb-core — wire format, cryptographic primitives, key store and
//! configuration. All other Bobb crates depend on this one.

pub mod config;
pub mod crypto;
pub mod keystore;
pub mod wire;

pub use crypto::{CryptoError, Keypair, PeerPublicKey, SealedChunk, SharedKey};
pub use keystore::{KeyStore, KeyStoreError};
pub use wire::{EncryptionAlgo, MandatoryHeader, OptionalHeader, WireError};
