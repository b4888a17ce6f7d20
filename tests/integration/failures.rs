//! Transfers that must fail, and fail without leaving output behind.

use bobb_core::crypto::CryptoError;
use bobb_core::KeyStoreError;
use bobb_services::TransferError;

use crate::*;

const CHUNK: usize = 1024;

async fn outbox(sats: &Constellation, len: usize) -> (bobb_services::ChunkStore, Vec<u8>) {
    let data = image(len);
    let store = sats.store("outbox");
    sats.pipeline(SAT_A, SAT_B, CHUNK)
        .unwrap()
        .encrypt_to_store(data.clone().into(), &store)
        .await
        .unwrap();
    (store, data)
}

#[tokio::test]
async fn test_missing_middle_chunk() {
    let sats = Constellation::new("missing-middle", &[SAT_A, SAT_B]).unwrap();
    let (store, _) = outbox(&sats, 4 * CHUNK).await;
    store.remove_chunk(2).await.unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, CHUNK).unwrap();
    let output = sats.path("out.bin");
    let err = receiver.reassemble_file(&store, &output).await.unwrap_err();
    assert!(matches!(err, TransferError::MissingChunk(2)));
    assert_eq!(err.code(), "MISSING_CHUNK");
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_final_chunk() {
    let sats = Constellation::new("missing-final", &[SAT_A, SAT_B]).unwrap();
    let (store, _) = outbox(&sats, 3 * CHUNK + 10).await;
    store.remove_chunk(3).await.unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, CHUNK).unwrap();
    assert!(matches!(
        receiver.reassemble_from_store(&store).await,
        Err(TransferError::MissingChunk(3))
    ));
}

#[tokio::test]
async fn test_tampered_chunk_on_disk() {
    let sats = Constellation::new("tampered", &[SAT_A, SAT_B]).unwrap();
    let (store, _) = outbox(&sats, 3 * CHUNK).await;

    let path = store.chunk_path(1);
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;
    std::fs::write(&path, bytes).unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, CHUNK).unwrap();
    let output = sats.path("out.bin");
    let err = receiver.reassemble_file(&store, &output).await.unwrap_err();
    assert!(err.is_authentication_failure());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_wrong_recipient_cannot_decrypt() {
    let sats = Constellation::new("wrong-recipient", &[SAT_A, SAT_B, "SatelliteC"]).unwrap();
    let (store, _) = outbox(&sats, 2 * CHUNK).await;

    let eavesdropper = sats.pipeline("SatelliteC", SAT_A, CHUNK).unwrap();
    assert!(matches!(
        eavesdropper.reassemble_from_store(&store).await,
        Err(TransferError::Crypto(CryptoError::AuthenticationFailure))
    ));
}

#[tokio::test]
async fn test_truncated_chunk_file() {
    let sats = Constellation::new("truncated", &[SAT_A, SAT_B]).unwrap();
    let (store, _) = outbox(&sats, 2 * CHUNK).await;
    std::fs::write(store.chunk_path(0), [0u8; 4]).unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, CHUNK).unwrap();
    let err = receiver.reassemble_from_store(&store).await.unwrap_err();
    assert!(matches!(err, TransferError::MalformedChunkFile { .. }));
}

#[tokio::test]
async fn test_replaced_manifest_is_caught() {
    let sats = Constellation::new("manifest", &[SAT_A, SAT_B]).unwrap();
    let (store, data) = outbox(&sats, 2 * CHUNK).await;

    let mut manifest = store.read_manifest().await.unwrap().unwrap();
    manifest.payload_hash = hex::encode(bobb_core::crypto::hash(&data[1..]));
    store.write_manifest(&manifest).await.unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, CHUNK).unwrap();
    assert!(matches!(
        receiver.reassemble_from_store(&store).await,
        Err(TransferError::ManifestMismatch(_))
    ));
}

#[test]
fn test_unknown_peer_key_is_reported() {
    let sats = Constellation::new("unknown-peer", &[SAT_A]).unwrap();
    let err = sats.shared_key(SAT_A, "SatelliteZ").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KeyStoreError>(),
        Some(KeyStoreError::Io { .. })
    ));
}
