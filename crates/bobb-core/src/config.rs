//! Configuration system for Bobb.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BOBB_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/bobb/config.toml
//!   3. ~/.config/bobb/config.toml
//!
//! Components never read this themselves. The binaries load it once and
//! pass the relevant sections down as constructor parameters.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BobbConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Node identity. Key files are named after it.
    pub name: String,
    /// What this node does, e.g. "disaster-imaging".
    pub function: String,
    /// Directory holding `<name>_private_key.pem` / `<name>_public_key.pem`.
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address stamped as the source of outbound headers.
    pub address: Ipv6Addr,
    /// Port stamped as the source of outbound headers.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Plaintext bytes per chunk.
    pub chunk_size: usize,
    /// Chunks encrypted or decrypted concurrently. 0 = number of CPUs.
    pub workers: usize,
    /// "random" or "sequential".
    pub nonce_mode: NonceMode,
    /// Where chunk stores are created.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP port of the header boundary.
    pub port: u16,
}

/// How the pipeline chooses per-chunk nonces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceMode {
    /// 96 fresh random bits per chunk.
    #[default]
    Random,
    /// 64 random bits per payload followed by the big-endian chunk_id.
    Sequential,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default plaintext chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default API port.
pub const DEFAULT_API_PORT: u16 = 30001;

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: generate_name(),
            function: "disaster-imaging".to_string(),
            key_dir: data_dir().join("keys"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: Ipv6Addr::LOCALHOST,
            port: DEFAULT_API_PORT,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            nonce_mode: NonceMode::Random,
            output_dir: data_dir().join("encrypted_chunks"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_API_PORT,
        }
    }
}

/// Random node name, e.g. "sat-3fa92c1b".
fn generate_name() -> String {
    let mut suffix = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("sat-{}", hex::encode(suffix))
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("bobb")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("bobb")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BobbConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file, falling back to defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(BobbConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BOBB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    ///
    /// The generated node name is persisted so the identity is stable
    /// across restarts.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BobbConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BOBB_* overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("BOBB_IDENTITY__NAME") {
            self.identity.name = v;
        }
        if let Some(v) = lookup("BOBB_IDENTITY__KEY_DIR") {
            self.identity.key_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BOBB_NETWORK__ADDRESS") {
            if let Ok(a) = v.parse() {
                self.network.address = a;
            }
        }
        if let Some(v) = lookup("BOBB_TRANSFER__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transfer.chunk_size = n;
            }
        }
        if let Some(v) = lookup("BOBB_TRANSFER__WORKERS") {
            if let Ok(n) = v.parse() {
                self.transfer.workers = n;
            }
        }
        if let Some(v) = lookup("BOBB_TRANSFER__NONCE_MODE") {
            match v.as_str() {
                "random" => self.transfer.nonce_mode = NonceMode::Random,
                "sequential" => self.transfer.nonce_mode = NonceMode::Sequential,
                _ => {}
            }
        }
        if let Some(v) = lookup("BOBB_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
    }
}
