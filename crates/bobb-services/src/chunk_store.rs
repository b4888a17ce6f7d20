//! Chunk store — encrypted chunks as files in one directory.
//!
//! Layout:
//!   <dir>/chunk_<id>.enc    nonce(12) || ciphertext(+tag), <id> zero-based decimal
//!   <dir>/manifest.json     TransferManifest
//!
//! Directory listing order carries no meaning. Ids are parsed numerically
//! from file names, never compared as strings.

use std::path::{Path, PathBuf};

use crate::chunk_types::{Chunk, TransferManifest};
use crate::error::TransferError;

pub const MANIFEST_FILE: &str = "manifest.json";

const CHUNK_PREFIX: &str = "chunk_";
const CHUNK_SUFFIX: &str = ".enc";

#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, chunk_id: u32) -> PathBuf {
        self.dir.join(format!("{CHUNK_PREFIX}{chunk_id}{CHUNK_SUFFIX}"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TransferError::io(&self.dir, e))
    }

    pub async fn write_chunk(&self, chunk: &Chunk) -> Result<(), TransferError> {
        self.ensure_dir().await?;
        let path = self.chunk_path(chunk.chunk_id);
        tokio::fs::write(&path, chunk.to_file_bytes())
            .await
            .map_err(|e| TransferError::io(&path, e))?;
        tracing::debug!(chunk_id = chunk.chunk_id, path = %path.display(), "chunk written");
        Ok(())
    }

    pub async fn read_chunk(&self, chunk_id: u32) -> Result<Chunk, TransferError> {
        let path = self.chunk_path(chunk_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::MissingChunk(chunk_id))
            }
            Err(e) => return Err(TransferError::io(&path, e)),
        };
        Chunk::from_file_bytes(chunk_id, &data)
            .map_err(|reason| TransferError::MalformedChunkFile { path, reason })
    }

    /// Every chunk in the directory, in whatever order the listing returns.
    /// Files that do not follow the chunk naming scheme are skipped.
    pub async fn read_all(&self) -> Result<Vec<Chunk>, TransferError> {
        let mut chunks = Vec::new();
        for chunk_id in self.chunk_ids().await? {
            chunks.push(self.read_chunk(chunk_id).await?);
        }
        Ok(chunks)
    }

    /// Ids of the chunk files present, unsorted.
    pub async fn chunk_ids(&self) -> Result<Vec<u32>, TransferError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| TransferError::io(&self.dir, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TransferError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match parse_chunk_file_name(name) {
                Some(id) => ids.push(id),
                None if name == MANIFEST_FILE => {}
                None => tracing::debug!(file = name, "ignoring non-chunk file in chunk store"),
            }
        }
        Ok(ids)
    }

    pub async fn remove_chunk(&self, chunk_id: u32) -> Result<(), TransferError> {
        let path = self.chunk_path(chunk_id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| TransferError::io(&path, e))
    }

    pub async fn write_manifest(&self, manifest: &TransferManifest) -> Result<(), TransferError> {
        self.ensure_dir().await?;
        let path = self.manifest_path();
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| {
            TransferError::MalformedManifest {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| TransferError::io(&path, e))
    }

    /// The stored manifest, or `None` for a bare chunk directory.
    pub async fn read_manifest(&self) -> Result<Option<TransferManifest>, TransferError> {
        let path = self.manifest_path();
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TransferError::io(&path, e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| TransferError::MalformedManifest {
                path,
                reason: e.to_string(),
            })
    }

    /// Remove every chunk file and the manifest, leaving unrelated files.
    /// Returns the number of chunk files removed. A missing directory is
    /// already clear.
    pub async fn clear(&self) -> Result<usize, TransferError> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(0);
        }
        let ids = self.chunk_ids().await?;
        for &id in &ids {
            self.remove_chunk(id).await?;
        }
        let manifest = self.manifest_path();
        match tokio::fs::remove_file(&manifest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TransferError::io(&manifest, e)),
        }
        Ok(ids.len())
    }
}

/// `chunk_<decimal>.enc` → id. Anything else → `None`.
pub fn parse_chunk_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?.strip_suffix(CHUNK_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
