//! bobb-services — the chunked transfer pipeline and its on-disk chunk store.

pub mod chunk_store;
pub mod chunk_types;
pub mod error;
pub mod pipeline;

pub use chunk_store::ChunkStore;
pub use chunk_types::{Chunk, EncryptedPayload, TransferManifest};
pub use error::TransferError;
pub use pipeline::{ChunkPipeline, PipelineSettings};
