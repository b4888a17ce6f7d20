//! Chunked encrypt / reassemble commands.

use std::path::Path;

use anyhow::{Context, Result};

use bobb_core::KeyStore;
use bobb_services::{ChunkPipeline, ChunkStore, PipelineSettings};

use super::short;

fn pipeline(
    store: &KeyStore,
    local: &str,
    peer: &str,
    settings: PipelineSettings,
) -> Result<ChunkPipeline> {
    let key = store
        .derive_shared_key(local, peer)
        .with_context(|| format!("failed to derive key between {local} and {peer}"))?;
    eprintln!("shared key {}", key.fingerprint());
    Ok(ChunkPipeline::new(key, settings)?)
}

pub async fn cmd_encrypt(
    store: &KeyStore,
    settings: PipelineSettings,
    local: &str,
    peer: &str,
    input: &Path,
    chunk_dir: &Path,
) -> Result<()> {
    let pipeline = pipeline(store, local, peer, settings)?;
    let chunks = ChunkStore::new(chunk_dir);
    let manifest = pipeline
        .encrypt_file(input, &chunks)
        .await
        .with_context(|| format!("failed to encrypt {}", input.display()))?;

    println!(
        "Encrypted {} bytes into {} chunks of up to {} bytes",
        manifest.total_bytes, manifest.chunk_count, manifest.chunk_size
    );
    println!("  chunks : {}", chunk_dir.display());
    println!("  digest : {}", short(&manifest.payload_hash));
    Ok(())
}

pub async fn cmd_decrypt(
    store: &KeyStore,
    settings: PipelineSettings,
    local: &str,
    peer: &str,
    chunk_dir: &Path,
    output: &Path,
) -> Result<()> {
    let pipeline = pipeline(store, local, peer, settings)?;
    let chunks = ChunkStore::new(chunk_dir);
    let bytes = pipeline
        .reassemble_file(&chunks, output)
        .await
        .with_context(|| format!("failed to reassemble {}", chunk_dir.display()))?;
    println!("Reassembled {bytes} bytes into {}", output.display());
    Ok(())
}
