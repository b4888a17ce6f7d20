//! bobbd — Bobb satellite node daemon.

use std::net::SocketAddrV6;

use anyhow::{Context, Result};

use bobb_api::ApiState;
use bobb_core::config::BobbConfig;
use bobb_core::KeyStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BobbConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BobbConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BobbConfig::default()
    });
    let identity = &config.identity;
    tracing::info!(
        name = %identity.name,
        function = %identity.function,
        "bobbd starting"
    );

    // Keypair
    let keystore = KeyStore::new(&identity.key_dir);
    let provisioned = !keystore.exists(&identity.name);
    let keypair = keystore
        .load_or_generate(&identity.name)
        .with_context(|| format!("failed to load keys for {}", identity.name))?;
    if provisioned {
        tracing::info!(dir = %keystore.key_dir().display(), "generated new identity keypair");
    }
    tracing::info!(public_key = %keypair.public_key().to_hex(), "keypair ready");

    tracing::info!(
        chunk_size = config.transfer.chunk_size,
        workers = config.transfer.workers,
        nonce_mode = ?config.transfer.nonce_mode,
        output = %config.transfer.output_dir.display(),
        "transfer settings"
    );

    // API
    let local = SocketAddrV6::new(config.network.address, config.network.port, 0, 0);
    let state = ApiState::new(
        identity.name.clone(),
        identity.function.clone(),
        keypair.public_key(),
        local,
    );
    drop(keypair);
    let api_task = tokio::spawn(bobb_api::serve(state, config.api.port));

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
        r = api_task => match r {
            Ok(Ok(())) => tracing::error!("API server exited"),
            Ok(Err(e)) => return Err(e.context("API server failed")),
            Err(e) => tracing::error!("API task panicked: {:?}", e),
        },
    }

    Ok(())
}
