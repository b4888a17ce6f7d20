//! HTTP API handlers — header construction and node status.

pub mod create_header;
pub mod status;

use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bobb_core::PeerPublicKey;

#[derive(Clone)]
pub struct ApiState {
    /// Node identity, e.g. "SatelliteA".
    pub name: String,
    /// What the node does, e.g. "disaster-imaging".
    pub function: String,
    pub public_key: PeerPublicKey,
    /// Source address and port stamped on response headers.
    pub local: SocketAddrV6,
    sequence: Arc<AtomicU32>,
}

impl ApiState {
    pub fn new(
        name: impl Into<String>,
        function: impl Into<String>,
        public_key: PeerPublicKey,
        local: SocketAddrV6,
    ) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            public_key,
            local,
            sequence: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Response sequence numbers start at 1 and wrap.
    pub(crate) fn next_sequence(&self) -> u32 {
        self.sequence
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }
}

pub use create_header::handle_create_header;
pub use status::handle_status;
