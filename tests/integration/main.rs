//! Bobb integration test harness.
//!
//! Two satellites share a temporary key directory. Each test provisions
//! its own identities and chunk stores under a unique directory and removes
//! it when done.
//!
//!   cargo test --test integration

use std::path::{Path, PathBuf};

use anyhow::Result;

use bobb_core::{KeyStore, SharedKey};
use bobb_services::{ChunkPipeline, ChunkStore, PipelineSettings};

mod exchange;
mod failures;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const SAT_A: &str = "SatelliteA";
pub const SAT_B: &str = "SatelliteB";

/// A scratch directory holding keys and chunk stores for one test.
pub struct Constellation {
    pub root: PathBuf,
    pub keys: KeyStore,
}

impl Constellation {
    /// Provision keys for `identities` under a fresh directory.
    pub fn new(test: &str, identities: &[&str]) -> Result<Self> {
        let root = std::env::temp_dir().join(format!("bobb-it-{test}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let keys = KeyStore::new(root.join("keys"));
        for id in identities {
            keys.generate(id)?;
        }
        Ok(Self { root, keys })
    }

    pub fn store(&self, name: &str) -> ChunkStore {
        ChunkStore::new(self.root.join(name))
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The key `local` derives for talking to `peer`, from files only.
    pub fn shared_key(&self, local: &str, peer: &str) -> Result<SharedKey> {
        Ok(self.keys.derive_shared_key(local, peer)?)
    }

    pub fn pipeline(&self, local: &str, peer: &str, chunk_size: usize) -> Result<ChunkPipeline> {
        let settings = PipelineSettings {
            chunk_size,
            workers: 4,
            ..PipelineSettings::default()
        };
        Ok(ChunkPipeline::new(self.shared_key(local, peer)?, settings)?)
    }
}

impl Drop for Constellation {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// Deterministic pseudo-image bytes.
pub fn image(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Chunk file names currently in `dir`, sorted.
pub fn chunk_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.starts_with("chunk_"))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
