//! Chunked transfer pipeline — split, encrypt, store, reassemble.
//!
//! Send path: payload → fixed-size blocks → parallel seal → ordered merge.
//! Receive path: chunks → order/contiguity check → parallel open → ordered
//! concatenation → manifest check.
//!
//! Each chunk is sealed independently under the shared key with its own
//! nonce, so per-chunk work has no shared state and runs on the blocking
//! pool. The only barrier is the merge, which orders strictly by `chunk_id`.
//! Reassembly is all-or-nothing: if any chunk fails authentication nothing
//! is returned and nothing is written.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use bobb_core::config::{NonceMode, TransferConfig, DEFAULT_CHUNK_SIZE};
use bobb_core::crypto::{self, SharedKey, NONCE_LEN};

use crate::chunk_store::ChunkStore;
use crate::chunk_types::{Chunk, EncryptedPayload, TransferManifest};
use crate::error::TransferError;

/// Worker count used when none is configured and the CPU count is unknown.
const FALLBACK_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Plaintext bytes per chunk. The final chunk may be shorter.
    pub chunk_size: usize,
    /// Chunks sealed or opened concurrently.
    pub workers: usize,
    pub nonce_mode: NonceMode,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: FALLBACK_WORKERS,
            nonce_mode: NonceMode::Random,
        }
    }
}

impl From<&TransferConfig> for PipelineSettings {
    fn from(config: &TransferConfig) -> Self {
        let workers = if config.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_WORKERS)
        } else {
            config.workers
        };
        Self {
            chunk_size: config.chunk_size,
            workers,
            nonce_mode: config.nonce_mode,
        }
    }
}

/// Encrypts and reassembles payloads under one shared key.
#[derive(Clone)]
pub struct ChunkPipeline {
    key: Arc<SharedKey>,
    settings: PipelineSettings,
}

impl ChunkPipeline {
    pub fn new(key: SharedKey, settings: PipelineSettings) -> Result<Self, TransferError> {
        if settings.chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        Ok(Self {
            key: Arc::new(key),
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn workers(&self) -> usize {
        self.settings.workers.max(1)
    }

    /// Split `payload` into `(chunk_id, block)` pairs without copying.
    /// An empty payload yields no chunks.
    pub fn split(&self, payload: &Bytes) -> Result<Vec<(u32, Bytes)>, TransferError> {
        let size = self.settings.chunk_size;
        let count = payload.len().div_ceil(size);
        if count > u32::MAX as usize {
            return Err(TransferError::TooManyChunks);
        }
        Ok((0..count)
            .map(|i| {
                let start = i * size;
                let end = (start + size).min(payload.len());
                (i as u32, payload.slice(start..end))
            })
            .collect())
    }

    // ── Send path ─────────────────────────────────────────────────────────────

    pub async fn encrypt(&self, payload: Bytes) -> Result<EncryptedPayload, TransferError> {
        let started = Instant::now();
        let blocks = self.split(&payload)?;
        let chunk_count = blocks.len() as u32;
        let nonce_prefix = match self.settings.nonce_mode {
            NonceMode::Random => None,
            NonceMode::Sequential => Some(sequential_prefix()),
        };

        let mut chunks: Vec<Chunk> = stream::iter(blocks)
            .map(|(chunk_id, block)| {
                let key = self.key.clone();
                tokio::task::spawn_blocking(move || seal_block(&key, nonce_prefix, chunk_id, &block))
            })
            .buffer_unordered(self.workers())
            .map(|joined| joined.map_err(TransferError::from).and_then(|r| r))
            .try_collect()
            .await?;
        chunks.sort_unstable_by_key(|c| c.chunk_id);

        let manifest =
            TransferManifest::for_payload(&payload, self.settings.chunk_size, chunk_count);
        tracing::info!(
            bytes = payload.len(),
            chunks = chunk_count,
            workers = self.workers(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "payload encrypted"
        );
        Ok(EncryptedPayload { manifest, chunks })
    }

    /// Encrypt `payload` into `store`, replacing whatever it held before.
    ///
    /// The manifest is written before any chunk, so a store left behind by
    /// an interrupted write reports its first missing chunk instead of
    /// reassembling a prefix.
    pub async fn encrypt_to_store(
        &self,
        payload: Bytes,
        store: &ChunkStore,
    ) -> Result<TransferManifest, TransferError> {
        let encrypted = self.encrypt(payload).await?;
        let removed = store.clear().await?;
        if removed > 0 {
            tracing::debug!(removed, dir = %store.dir().display(), "cleared previous chunks");
        }
        store.write_manifest(&encrypted.manifest).await?;
        for chunk in &encrypted.chunks {
            store.write_chunk(chunk).await?;
        }
        tracing::info!(
            dir = %store.dir().display(),
            chunks = encrypted.manifest.chunk_count,
            "chunks stored"
        );
        Ok(encrypted.manifest)
    }

    pub async fn encrypt_file(
        &self,
        input: &Path,
        store: &ChunkStore,
    ) -> Result<TransferManifest, TransferError> {
        let data = tokio::fs::read(input)
            .await
            .map_err(|e| TransferError::io(input, e))?;
        self.encrypt_to_store(Bytes::from(data), store).await
    }

    // ── Receive path ──────────────────────────────────────────────────────────

    /// Reassemble an in-memory payload and check it against its manifest.
    pub async fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, TransferError> {
        let plaintext = self
            .decrypt_chunks(payload.chunks.clone(), Some(payload.manifest.chunk_count))
            .await?;
        payload.manifest.verify(&plaintext)?;
        Ok(plaintext)
    }

    /// Order, authenticate and concatenate `chunks`.
    ///
    /// With `expected` set, the chunk ids must be exactly `0..expected`.
    /// Without it only contiguity from 0 is checked, which cannot reveal a
    /// missing final chunk.
    pub async fn decrypt_chunks(
        &self,
        chunks: Vec<Chunk>,
        expected: Option<u32>,
    ) -> Result<Vec<u8>, TransferError> {
        let chunks = order_chunks(chunks, expected)?;

        let mut blocks: Vec<(u32, Vec<u8>)> = stream::iter(chunks)
            .map(|chunk| {
                let key = self.key.clone();
                tokio::task::spawn_blocking(move || {
                    crypto::open(&key, &chunk.nonce, &chunk.ciphertext)
                        .map(|plain| (chunk.chunk_id, plain))
                        .map_err(|e| (chunk.chunk_id, e))
                })
            })
            .buffer_unordered(self.workers())
            .map(|joined| match joined {
                Ok(Ok(block)) => Ok(block),
                Ok(Err((chunk_id, e))) => {
                    tracing::warn!(chunk_id, error = %e, "chunk failed authentication");
                    Err(TransferError::Crypto(e))
                }
                Err(e) => Err(TransferError::Worker(e)),
            })
            .try_collect()
            .await?;
        blocks.sort_unstable_by_key(|(id, _)| *id);

        let total = blocks.iter().map(|(_, b)| b.len()).sum();
        let mut out = Vec::with_capacity(total);
        for (_, block) in blocks {
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    pub async fn reassemble_from_store(&self, store: &ChunkStore) -> Result<Vec<u8>, TransferError> {
        let manifest = store.read_manifest().await?;
        let chunks = store.read_all().await?;
        match manifest {
            Some(manifest) => {
                let plaintext = self
                    .decrypt_chunks(chunks, Some(manifest.chunk_count))
                    .await?;
                manifest.verify(&plaintext)?;
                Ok(plaintext)
            }
            None => {
                tracing::warn!(
                    dir = %store.dir().display(),
                    "no manifest in chunk store; a missing final chunk cannot be detected"
                );
                self.decrypt_chunks(chunks, None).await
            }
        }
    }

    /// Reassemble `store` into `output`. Data is written to `<output>.part`
    /// and renamed into place only after every chunk authenticated.
    /// Returns the number of bytes written.
    pub async fn reassemble_file(
        &self,
        store: &ChunkStore,
        output: &Path,
    ) -> Result<u64, TransferError> {
        let plaintext = self.reassemble_from_store(store).await?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::io(parent, e))?;
        }
        let partial = part_path(output);
        tokio::fs::write(&partial, &plaintext)
            .await
            .map_err(|e| TransferError::io(&partial, e))?;
        tokio::fs::rename(&partial, output)
            .await
            .map_err(|e| TransferError::io(output, e))?;

        tracing::info!(
            output = %output.display(),
            bytes = plaintext.len(),
            "payload reassembled"
        );
        Ok(plaintext.len() as u64)
    }
}

/// Sort by `chunk_id` and check the ids form `0..n` with no repeats.
/// `expected` is the manifest's chunk count, when there is one.
pub fn order_chunks(mut chunks: Vec<Chunk>, expected: Option<u32>) -> Result<Vec<Chunk>, TransferError> {
    chunks.sort_unstable_by_key(|c| c.chunk_id);

    for (index, chunk) in chunks.iter().enumerate() {
        let index = index as u32;
        if let Some(expected) = expected {
            if chunk.chunk_id >= expected {
                return Err(TransferError::UnexpectedChunk(chunk.chunk_id));
            }
        }
        if chunk.chunk_id > index {
            return Err(TransferError::MissingChunk(index));
        }
        if chunk.chunk_id < index {
            return Err(TransferError::DuplicateChunk(chunk.chunk_id));
        }
    }

    if let Some(expected) = expected {
        if (chunks.len() as u64) < expected as u64 {
            return Err(TransferError::MissingChunk(chunks.len() as u32));
        }
    }
    Ok(chunks)
}

fn seal_block(
    key: &SharedKey,
    nonce_prefix: Option<[u8; 8]>,
    chunk_id: u32,
    block: &[u8],
) -> Result<Chunk, TransferError> {
    let sealed = match nonce_prefix {
        None => crypto::seal(key, block)?,
        Some(prefix) => crypto::seal_with_nonce(key, sequential_nonce(prefix, chunk_id), block)?,
    };
    Ok(Chunk {
        chunk_id,
        nonce: sealed.nonce,
        ciphertext: Bytes::from(sealed.ciphertext),
    })
}

/// Random per-payload prefix for sequential nonces.
fn sequential_prefix() -> [u8; 8] {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&crypto::generate_nonce()[..8]);
    prefix
}

/// `prefix(8) || chunk_id (u32 big-endian)`.
fn sequential_nonce(prefix: [u8; 8], chunk_id: u32) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&prefix);
    nonce[8..].copy_from_slice(&chunk_id.to_be_bytes());
    nonce
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bobb_core::crypto::CryptoError;

    const CS: usize = 16;

    fn pipeline(key: SharedKey) -> ChunkPipeline {
        ChunkPipeline::new(
            key,
            PipelineSettings {
                chunk_size: CS,
                workers: 3,
                nonce_mode: NonceMode::Random,
            },
        )
        .unwrap()
    }

    fn test_key() -> SharedKey {
        SharedKey::from_bytes([0x42; 32])
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    fn temp_store(name: &str) -> ChunkStore {
        let dir = std::env::temp_dir().join(format!("bobb-pipeline-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ChunkStore::new(dir)
    }

    #[tokio::test]
    async fn seventy_bytes_make_five_chunks() {
        let p = pipeline(test_key());
        let data = payload(70);
        let encrypted = p.encrypt(data.clone()).await.unwrap();

        let ids: Vec<u32> = encrypted.chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        let plain_lens: Vec<usize> = encrypted
            .chunks
            .iter()
            .map(|c| c.ciphertext.len() - crypto::TAG_LEN)
            .collect();
        assert_eq!(plain_lens, vec![16, 16, 16, 16, 6]);
        assert_eq!(encrypted.manifest.chunk_count, 5);
        assert_eq!(encrypted.manifest.total_bytes, 70);

        assert_eq!(p.decrypt(&encrypted).await.unwrap(), data.to_vec());
    }

    #[tokio::test]
    async fn store_round_trip_across_sizes() {
        let p = pipeline(test_key());
        for len in [0, 1, CS - 1, CS, CS + 1, 5 * CS] {
            let store = temp_store(&format!("sizes-{len}"));
            let data = payload(len);
            let manifest = p.encrypt_to_store(data.clone(), &store).await.unwrap();
            assert_eq!(manifest.chunk_count as usize, len.div_ceil(CS));

            let back = p.reassemble_from_store(&store).await.unwrap();
            assert_eq!(back, data.to_vec(), "payload of {len} bytes");
            let _ = std::fs::remove_dir_all(store.dir());
        }
    }

    #[tokio::test]
    async fn chunk_order_is_irrelevant() {
        let p = pipeline(test_key());
        let data = payload(5 * CS + 3);
        let mut encrypted = p.encrypt(data.clone()).await.unwrap();
        encrypted.chunks.reverse();
        encrypted.chunks.swap(1, 3);
        assert_eq!(p.decrypt(&encrypted).await.unwrap(), data.to_vec());
    }

    #[tokio::test]
    async fn ids_beyond_nine_sort_numerically() {
        let p = pipeline(test_key());
        let store = temp_store("twelve");
        let data = payload(12 * CS);
        p.encrypt_to_store(data.clone(), &store).await.unwrap();
        assert!(store.chunk_path(11).exists());
        assert_eq!(p.reassemble_from_store(&store).await.unwrap(), data.to_vec());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn removing_any_chunk_is_detected() {
        let p = pipeline(test_key());
        let data = payload(4 * CS + 1);
        for missing in 0..5u32 {
            let store = temp_store(&format!("missing-{missing}"));
            p.encrypt_to_store(data.clone(), &store).await.unwrap();
            store.remove_chunk(missing).await.unwrap();

            match p.reassemble_from_store(&store).await {
                Err(TransferError::MissingChunk(id)) => assert_eq!(id, missing),
                other => panic!("expected MissingChunk({missing}), got {other:?}"),
            }
            let _ = std::fs::remove_dir_all(store.dir());
        }
    }

    #[tokio::test]
    async fn without_manifest_only_gaps_are_detected() {
        let p = pipeline(test_key());
        let store = temp_store("no-manifest");
        let data = payload(3 * CS);
        p.encrypt_to_store(data.clone(), &store).await.unwrap();
        tokio::fs::remove_file(store.manifest_path()).await.unwrap();

        assert_eq!(p.reassemble_from_store(&store).await.unwrap(), data.to_vec());

        store.remove_chunk(1).await.unwrap();
        assert!(matches!(
            p.reassemble_from_store(&store).await,
            Err(TransferError::MissingChunk(1))
        ));
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn interrupted_store_write_is_not_truncated_output() {
        let p = pipeline(test_key());
        let store = temp_store("interrupted");
        let encrypted = p.encrypt(payload(70)).await.unwrap();
        assert_eq!(encrypted.manifest.chunk_count, 5);

        // What encrypt_to_store leaves behind when stopped after two chunks.
        store.clear().await.unwrap();
        store.write_manifest(&encrypted.manifest).await.unwrap();
        for chunk in &encrypted.chunks[..2] {
            store.write_chunk(chunk).await.unwrap();
        }

        assert!(matches!(
            p.reassemble_from_store(&store).await,
            Err(TransferError::MissingChunk(2))
        ));
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn manifest_lands_before_chunks() {
        let p = pipeline(test_key());
        let store = temp_store("manifest-first");
        p.encrypt_to_store(payload(3 * CS), &store).await.unwrap();

        let modified = |path: PathBuf| std::fs::metadata(path).unwrap().modified().unwrap();
        let manifest_at = modified(store.manifest_path());
        for id in 0..3 {
            assert!(manifest_at <= modified(store.chunk_path(id)));
        }
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn tampered_chunk_fails_and_writes_nothing() {
        let p = pipeline(test_key());
        let store = temp_store("tamper");
        p.encrypt_to_store(payload(3 * CS), &store).await.unwrap();

        let mut chunk = store.read_chunk(2).await.unwrap();
        let mut ct = chunk.ciphertext.to_vec();
        ct[0] ^= 0x01;
        chunk.ciphertext = Bytes::from(ct);
        store.write_chunk(&chunk).await.unwrap();

        let output = store.dir().join("out").join("image.bin");
        let err = p.reassemble_file(&store, &output).await.unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(err.code(), "AUTHENTICATION_FAILURE");
        assert!(!output.exists());
        assert!(!part_path(&output).exists());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn chunk_cut_inside_the_tag_fails_authentication() {
        let p = pipeline(test_key());
        let store = temp_store("cut-tag");
        p.encrypt_to_store(payload(3 * CS), &store).await.unwrap();

        let path = store.chunk_path(1);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..NONCE_LEN + 10]).unwrap();

        let err = p.reassemble_from_store(&store).await.unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(err.code(), "AUTHENTICATION_FAILURE");
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn wrong_key_fails_authentication() {
        let sender = pipeline(test_key());
        let receiver = pipeline(SharedKey::from_bytes([0x43; 32]));
        let encrypted = sender.encrypt(payload(2 * CS)).await.unwrap();
        assert!(matches!(
            receiver.decrypt(&encrypted).await,
            Err(TransferError::Crypto(CryptoError::AuthenticationFailure))
        ));
    }

    #[tokio::test]
    async fn duplicate_and_out_of_range_ids_are_rejected() {
        let p = pipeline(test_key());
        let encrypted = p.encrypt(payload(3 * CS)).await.unwrap();

        let mut dup = encrypted.clone();
        dup.chunks.push(dup.chunks[1].clone());
        assert!(matches!(
            p.decrypt(&dup).await,
            Err(TransferError::DuplicateChunk(1))
        ));

        let mut extra = encrypted.clone();
        let mut stray = extra.chunks[0].clone();
        stray.chunk_id = 3;
        extra.chunks.push(stray);
        assert!(matches!(
            p.decrypt(&extra).await,
            Err(TransferError::UnexpectedChunk(3))
        ));
    }

    #[tokio::test]
    async fn swapped_chunk_ids_fail_the_manifest_digest() {
        // Chunks are not bound to their ids, so a swap decrypts cleanly and
        // only the manifest digest catches it.
        let p = pipeline(test_key());
        let data = payload(2 * CS);
        let mut encrypted = p.encrypt(data).await.unwrap();
        encrypted.chunks[0].chunk_id = 1;
        encrypted.chunks[1].chunk_id = 0;
        assert!(matches!(
            p.decrypt(&encrypted).await,
            Err(TransferError::ManifestMismatch(_))
        ));
    }

    #[tokio::test]
    async fn sequential_nonces_carry_the_chunk_id() {
        let p = ChunkPipeline::new(
            test_key(),
            PipelineSettings {
                chunk_size: CS,
                workers: 2,
                nonce_mode: NonceMode::Sequential,
            },
        )
        .unwrap();
        let data = payload(3 * CS);
        let encrypted = p.encrypt(data.clone()).await.unwrap();

        let prefix = &encrypted.chunks[0].nonce[..8];
        for chunk in &encrypted.chunks {
            assert_eq!(&chunk.nonce[..8], prefix);
            assert_eq!(chunk.nonce[8..], chunk.chunk_id.to_be_bytes());
        }
        assert_eq!(p.decrypt(&encrypted).await.unwrap(), data.to_vec());
    }

    #[tokio::test]
    async fn random_nonces_are_distinct() {
        let p = pipeline(test_key());
        let encrypted = p.encrypt(payload(8 * CS)).await.unwrap();
        let mut nonces: Vec<_> = encrypted.chunks.iter().map(|c| c.nonce).collect();
        nonces.sort_unstable();
        nonces.dedup();
        assert_eq!(nonces.len(), 8);
    }

    #[tokio::test]
    async fn reassemble_file_replaces_output_atomically() {
        let p = pipeline(test_key());
        let store = temp_store("file");
        let input = store.dir().with_extension("input");
        let data = payload(2 * CS + 5);
        std::fs::write(&input, &data).unwrap();

        p.encrypt_file(&input, &store).await.unwrap();
        let output = store.dir().join("restored.bin");
        let written = p.reassemble_file(&store, &output).await.unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), data.to_vec());
        assert!(!part_path(&output).exists());

        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[tokio::test]
    async fn encrypting_again_clears_stale_chunks() {
        let p = pipeline(test_key());
        let store = temp_store("restart");
        p.encrypt_to_store(payload(6 * CS), &store).await.unwrap();
        let data = payload(2 * CS);
        p.encrypt_to_store(data.clone(), &store).await.unwrap();

        assert!(!store.chunk_path(5).exists());
        assert_eq!(p.reassemble_from_store(&store).await.unwrap(), data.to_vec());
        let _ = std::fs::remove_dir_all(store.dir());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let settings = PipelineSettings {
            chunk_size: 0,
            ..PipelineSettings::default()
        };
        assert!(matches!(
            ChunkPipeline::new(test_key(), settings),
            Err(TransferError::InvalidChunkSize)
        ));
    }

    #[test]
    fn settings_from_config_resolve_workers() {
        let config = TransferConfig {
            workers: 0,
            chunk_size: 64,
            ..TransferConfig::default()
        };
        let settings = PipelineSettings::from(&config);
        assert!(settings.workers >= 1);
        assert_eq!(settings.chunk_size, 64);
    }

    #[tokio::test]
    async fn encrypted_payload_survives_json() {
        let p = pipeline(test_key());
        let data = payload(CS + 2);
        let encrypted = p.encrypt(data.clone()).await.unwrap();
        let json = serde_json::to_string(&encrypted).unwrap();
        let back: EncryptedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(p.decrypt(&back).await.unwrap(), data.to_vec());
    }
}
