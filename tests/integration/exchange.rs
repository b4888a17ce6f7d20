//! Successful exchanges between two satellites.

use bytes::Bytes;

use bobb_core::crypto;
use bobb_core::wire::{EncryptionAlgo, MandatoryHeader, OptionalHeader, MESSAGE_TYPE_REQUEST};
use bobb_services::{ChunkStore, EncryptedPayload};

use crate::*;

/// A encrypts an image into a chunk store, B reassembles it from its own
/// private key and A's public key.
#[tokio::test]
async fn test_image_exchange_through_chunk_store() {
    let sats = Constellation::new("exchange", &[SAT_A, SAT_B]).unwrap();
    let data = image(300 * 1024 + 17);
    let input = sats.path("capture.jpg");
    std::fs::write(&input, &data).unwrap();

    let sender = sats.pipeline(SAT_A, SAT_B, 64 * 1024).unwrap();
    let store = sats.store("outbox");
    let manifest = sender.encrypt_file(&input, &store).await.unwrap();
    assert_eq!(manifest.chunk_count, 5);
    assert_eq!(manifest.total_bytes, data.len() as u64);
    assert_eq!(chunk_files(store.dir()).len(), 5);

    let receiver = sats.pipeline(SAT_B, SAT_A, 64 * 1024).unwrap();
    let output = sats.path("inbox/capture.jpg");
    let written = receiver.reassemble_file(&store, &output).await.unwrap();
    assert_eq!(written, data.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), data);
}

/// Both ends derive the same key from files alone.
#[test]
fn test_key_agreement_from_key_files() {
    let sats = Constellation::new("agreement", &[SAT_A, SAT_B, "SatelliteC"]).unwrap();
    let ab = sats.shared_key(SAT_A, SAT_B).unwrap();
    let ba = sats.shared_key(SAT_B, SAT_A).unwrap();
    let ac = sats.shared_key(SAT_A, "SatelliteC").unwrap();
    assert_eq!(ab.fingerprint(), ba.fingerprint());
    assert_ne!(ab.fingerprint(), ac.fingerprint());
}

/// Chunks copied into the receiver's store in scrambled order, with a
/// receiver chunk size that differs from the sender's.
#[tokio::test]
async fn test_permuted_store_reassembles() {
    let sats = Constellation::new("permuted", &[SAT_A, SAT_B]).unwrap();
    let data = image(12 * 100 + 3);

    let sender = sats.pipeline(SAT_A, SAT_B, 100).unwrap();
    let encrypted = sender.encrypt(Bytes::from(data.clone())).await.unwrap();
    assert_eq!(encrypted.chunks.len(), 13);

    let inbox = sats.store("inbox");
    let mut order: Vec<usize> = (0..encrypted.chunks.len()).collect();
    order.sort_by_key(|i| (i * 7) % 13);
    for i in order {
        inbox.write_chunk(&encrypted.chunks[i]).await.unwrap();
    }
    inbox.write_manifest(&encrypted.manifest).await.unwrap();

    let receiver = sats.pipeline(SAT_B, SAT_A, 4096).unwrap();
    assert_eq!(receiver.reassemble_from_store(&inbox).await.unwrap(), data);
}

/// The in-memory form survives a JSON hop, tagged with a header pair.
#[tokio::test]
async fn test_headers_and_json_payload_travel_together() {
    let sats = Constellation::new("json", &[SAT_A, SAT_B]).unwrap();
    let data = image(1000);

    let header = MandatoryHeader::new(
        (1, 0),
        MESSAGE_TYPE_REQUEST,
        "[2001:0:130f::9c0:876a:130b]:30001".parse().unwrap(),
        "[2001:0:130f::9c0:876a:130c]:30001".parse().unwrap(),
        1,
        1_700_000_000,
    );
    let optional = OptionalHeader::new(1_700_000_000, 10, 1, EncryptionAlgo::Aes256Gcm);

    let sender = sats.pipeline(SAT_A, SAT_B, 256).unwrap();
    let encrypted = sender.encrypt(Bytes::from(data.clone())).await.unwrap();
    let message = serde_json::json!({
        "header": header.to_hex(),
        "optional_header": optional.to_hex(),
        "payload": encrypted,
    })
    .to_string();

    let received: serde_json::Value = serde_json::from_str(&message).unwrap();
    let header_in = MandatoryHeader::from_hex(received["header"].as_str().unwrap()).unwrap();
    let optional_in =
        OptionalHeader::from_hex(received["optional_header"].as_str().unwrap()).unwrap();
    assert_eq!(header_in, header);
    assert_eq!(optional_in.encryption_algo(), EncryptionAlgo::Aes256Gcm);

    let payload: EncryptedPayload = serde_json::from_value(received["payload"].clone()).unwrap();
    let receiver = sats.pipeline(SAT_B, SAT_A, 256).unwrap();
    assert_eq!(receiver.decrypt(&payload).await.unwrap(), data);
}

/// A single message sealed without chunking opens on the other side.
#[test]
fn test_single_message_round_trip() {
    let sats = Constellation::new("message", &[SAT_A, SAT_B]).unwrap();
    let ab = sats.shared_key(SAT_A, SAT_B).unwrap();
    let ba = sats.shared_key(SAT_B, SAT_A).unwrap();

    let blob = crypto::seal_message(&ab, b"capture window opens at 12:04 UTC").unwrap();
    assert_eq!(
        crypto::open_message(&ba, &blob).unwrap(),
        b"capture window opens at 12:04 UTC"
    );
}

/// An empty payload is zero chunks and reassembles to nothing.
#[tokio::test]
async fn test_empty_payload() {
    let sats = Constellation::new("empty", &[SAT_A, SAT_B]).unwrap();
    let store: ChunkStore = sats.store("outbox");
    let sender = sats.pipeline(SAT_A, SAT_B, 1024).unwrap();
    let manifest = sender.encrypt_to_store(Bytes::new(), &store).await.unwrap();
    assert_eq!(manifest.chunk_count, 0);
    assert!(chunk_files(store.dir()).is_empty());

    let receiver = sats.pipeline(SAT_B, SAT_A, 1024).unwrap();
    assert!(receiver.reassemble_from_store(&store).await.unwrap().is_empty());
}
