//! Transport Binding: one pluggable backend per network mechanism.
//!
//! The engine picks one implementation at configuration load and keeps it for
//! its whole lifetime. Every backend maps the same capability set onto its
//! native primitive: a datagram socket, a framed TCP stream, or an RPC-style
//! unary call per send. `poll_receive` never blocks; cooperative schedulers
//! call it once per tick.

use std::io;

use serde::{Deserialize, Serialize};

use crate::peer::Peer;
use crate::wire;

pub mod datagram;
pub mod memory;
pub mod rpc;
pub mod stream;

pub use datagram::DatagramTransport;
pub use memory::{MemoryHub, MemoryTransport};
pub use rpc::RpcTransport;
pub use stream::StreamTransport;

/// Failure at the backend. Bind failures are fatal to engine construction;
/// everything else is one missed delivery, logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bind {endpoint} failed: {source}")]
    Bind {
        endpoint: String,
        source: io::Error,
    },
    #[error("connect {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),
    #[error("endpoint {0} does not resolve")]
    BadEndpoint(String),
}

/// Which backend to bind, chosen once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Rpc,
    Datagram,
    Stream,
}

/// Uniform capability set over one network mechanism.
pub trait Transport: Send {
    /// Prepare a path to `peer`. Backends without persistent connections
    /// treat this as a no-op; connection-oriented ones may dial eagerly.
    fn connect(&mut self, peer: &Peer) -> Result<(), TransportError>;

    /// Ship one encoded unit to `peer`. Synchronous; a failure is reported
    /// inline and not retried here.
    fn send(&mut self, peer: &Peer, unit: &[u8]) -> Result<(), TransportError>;

    /// Non-blocking: at most one complete unit per call, `None` when nothing
    /// is ready.
    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release every live connection. Idempotent.
    fn close(&mut self);
}

/// Bind the configured backend. A bind failure here fails engine
/// construction outright; the host cannot run without a working transport.
pub fn create(
    kind: TransportKind,
    bind_endpoint: &str,
) -> Result<Box<dyn Transport>, TransportError> {
    Ok(match kind {
        TransportKind::Rpc => Box::new(RpcTransport::bind(bind_endpoint)?),
        TransportKind::Datagram => Box::new(DatagramTransport::bind(bind_endpoint)?),
        TransportKind::Stream => Box::new(StreamTransport::bind(bind_endpoint)?),
    })
}

/// A byte stream whose framing can no longer be trusted. The connection
/// carrying it must be dropped; there is no way back to a unit boundary.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Poisoned;

/// Per-connection reassembly of length-prefixed units from a byte stream.
/// Only the prefix is inspected; payload bytes stay opaque.
#[derive(Default)]
pub(crate) struct Reassembly {
    buf: Vec<u8>,
}

impl Reassembly {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract one complete unit (prefix included). `Ok(None)` means more
    /// bytes are needed. A length above the wire limit poisons the stream:
    /// the buffer is discarded and the caller must drop the connection.
    pub fn next_unit(&mut self) -> Result<Option<Vec<u8>>, Poisoned> {
        if self.buf.len() < wire::PREFIX_SIZE {
            return Ok(None);
        }
        let len =
            u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > wire::MAX_UNIT_LEN {
            self.buf.clear();
            return Err(Poisoned);
        }
        let total = wire::PREFIX_SIZE + len;
        if self.buf.len() < total {
            return Ok(None);
        }
        let rest = self.buf.split_off(total);
        let unit = std::mem::replace(&mut self.buf, rest);
        Ok(Some(unit))
    }
}
