//! Key provisioning commands.

use anyhow::{Context, Result};

use bobb_core::KeyStore;

use super::short;

pub fn cmd_keygen(store: &KeyStore, identity: &str, force: bool) -> Result<()> {
    if store.exists(identity) && !force {
        anyhow::bail!(
            "keys for {identity} already exist in {} (use --force to replace them)",
            store.key_dir().display()
        );
    }
    let keypair = store
        .generate(identity)
        .with_context(|| format!("failed to generate keys for {identity}"))?;

    println!("Generated X25519 keypair for {identity}");
    println!("  private : {}", store.private_key_path(identity).display());
    println!("  public  : {}", store.public_key_path(identity).display());
    println!("  key     : {}", keypair.public_key().to_hex());
    Ok(())
}

pub fn cmd_pubkey(store: &KeyStore, identity: &str) -> Result<()> {
    let public = store
        .load_public_key(identity)
        .with_context(|| format!("failed to load public key for {identity}"))?;
    println!("{}", public.to_hex());
    Ok(())
}

/// Derive the key `local` shares with `peer` and print its fingerprint.
/// Both sides of a link print the same value.
pub fn cmd_derive(store: &KeyStore, local: &str, peer: &str) -> Result<()> {
    let key = store
        .derive_shared_key(local, peer)
        .with_context(|| format!("failed to derive key between {local} and {peer}"))?;
    let peer_public = store.load_public_key(peer)?;

    println!("═══════════════════════════════════════");
    println!("  Shared Key");
    println!("═══════════════════════════════════════");
    println!("  local       : {local}");
    println!("  peer        : {peer} ({})", short(&peer_public.to_hex()));
    println!("  fingerprint : {}", key.fingerprint());
    Ok(())
}
