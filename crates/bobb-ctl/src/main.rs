//! bobb-ctl — command-line tool for Bobb keys, headers and chunked transfers.

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use bobb_core::config::{BobbConfig, TransferConfig};
use bobb_core::KeyStore;
use bobb_services::PipelineSettings;

use cmd::{header, keys, transfer};

fn print_usage() {
    println!("Usage: bobb-ctl [options] <command>");
    println!();
    println!("Commands:");
    println!("  keygen <identity> [--force]             Generate and store an X25519 keypair");
    println!("  pubkey <identity>                       Print an identity's public key");
    println!("  derive <local> <peer>                   Print the fingerprint of a shared key");
    println!("  header encode <json>                    Encode headers from create-header JSON");
    println!("  header inspect <hex> [<hex>]            Decode header values");
    println!("  encrypt <file> [<chunk-dir>] --local <id> --peer <id>");
    println!("                                          Encrypt a file into a chunk store");
    println!("  decrypt [<chunk-dir>] <file> --local <id> --peer <id>");
    println!("                                          Reassemble a chunk store into a file");
    println!();
    println!("  <chunk-dir> defaults to transfer.output_dir from config.");
    println!();
    println!("Options:");
    println!("  --key-dir <dir>      Key directory (default: from config)");
    println!("  --chunk-size <n>     Plaintext bytes per chunk (default: from config)");
    println!("  --workers <n>        Concurrent chunk workers (default: from config)");
}

/// Options that may appear anywhere on the command line.
struct Options {
    key_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
    workers: Option<usize>,
    local: Option<String>,
    peer: Option<String>,
    force: bool,
}

fn parse_options(args: &[String]) -> Result<(Options, Vec<&str>)> {
    let mut opts = Options {
        key_dir: None,
        chunk_size: None,
        workers: None,
        local: None,
        peer: None,
        force: false,
    };
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--key-dir" | "--chunk-size" | "--workers" | "--local" | "--peer" => {
                i += 1;
                let value = args
                    .get(i)
                    .with_context(|| format!("{flag} requires a value"))?;
                match flag {
                    "--key-dir" => opts.key_dir = Some(PathBuf::from(value)),
                    "--chunk-size" => {
                        opts.chunk_size =
                            Some(value.parse().context("--chunk-size must be a number")?)
                    }
                    "--workers" => {
                        opts.workers = Some(value.parse().context("--workers must be a number")?)
                    }
                    "--local" => opts.local = Some(value.clone()),
                    _ => opts.peer = Some(value.clone()),
                }
            }
            "--force" => opts.force = true,
            _ => remaining.push(flag),
        }
        i += 1;
    }
    Ok((opts, remaining))
}

/// Chunk directory given on the command line, or the configured one.
fn chunk_dir_or_default(arg: Option<&str>, transfer: &TransferConfig) -> PathBuf {
    arg.map(PathBuf::from)
        .unwrap_or_else(|| transfer.output_dir.clone())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (opts, remaining) = parse_options(&args)?;

    let config = BobbConfig::load().context("failed to load config")?;
    let store = KeyStore::new(opts.key_dir.unwrap_or(config.identity.key_dir.clone()));

    let mut settings = PipelineSettings::from(&config.transfer);
    if let Some(n) = opts.chunk_size {
        settings.chunk_size = n;
    }
    if let Some(n) = opts.workers {
        settings.workers = n;
    }

    let pair = || -> Result<(String, String)> {
        let local = opts.local.clone().context("--local <identity> is required")?;
        let peer = opts.peer.clone().context("--peer <identity> is required")?;
        Ok((local, peer))
    };

    match remaining.as_slice() {
        ["keygen", identity] => keys::cmd_keygen(&store, identity, opts.force),
        ["keygen"] => keys::cmd_keygen(&store, &config.identity.name, opts.force),
        ["pubkey", identity] => keys::cmd_pubkey(&store, identity),
        ["pubkey"] => keys::cmd_pubkey(&store, &config.identity.name),
        ["derive", local, peer] => keys::cmd_derive(&store, local, peer),
        ["header", "encode", json] => header::cmd_encode(json),
        ["header", "inspect", values @ ..] if !values.is_empty() && values.len() <= 2 => {
            header::cmd_inspect(values)
        }
        ["encrypt", input, chunk_dir @ ..] if chunk_dir.len() <= 1 => {
            let (local, peer) = pair()?;
            let chunk_dir = chunk_dir_or_default(chunk_dir.first().copied(), &config.transfer);
            transfer::cmd_encrypt(
                &store,
                settings,
                &local,
                &peer,
                Path::new(input),
                &chunk_dir,
            )
            .await
        }
        ["decrypt", chunk_dir @ .., output] if chunk_dir.len() <= 1 => {
            let (local, peer) = pair()?;
            let chunk_dir = chunk_dir_or_default(chunk_dir.first().copied(), &config.transfer);
            transfer::cmd_decrypt(
                &store,
                settings,
                &local,
                &peer,
                &chunk_dir,
                Path::new(output),
            )
            .await
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
