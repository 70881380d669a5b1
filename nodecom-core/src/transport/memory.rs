//! In-process backend: a hub of per-endpoint mailboxes. Used by the engine
//! tests to simulate a network with observable destinations, and usable as a
//! loopback transport for single-process simulations.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::peer::Peer;
use crate::transport::{Transport, TransportError};

type Mailbox = (Sender<Vec<u8>>, Receiver<Vec<u8>>);

/// Shared fabric connecting every attached transport. Mailboxes are created
/// on demand, so a test can observe traffic addressed to an endpoint no
/// engine is running on.
#[derive(Default)]
pub struct MemoryHub {
    boxes: Mutex<HashMap<String, Mailbox>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn mailbox(&self, endpoint: &str) -> Mailbox {
        let mut boxes = self.boxes.lock();
        boxes
            .entry(endpoint.to_string())
            .or_insert_with(unbounded)
            .clone()
    }

    /// Attach a transport bound to `endpoint`.
    pub fn attach(self: &Arc<Self>, endpoint: &str) -> MemoryTransport {
        let (_, rx) = self.mailbox(endpoint);
        MemoryTransport {
            hub: self.clone(),
            rx,
        }
    }

    /// Deliver raw bytes to `endpoint`, as if a remote node had sent them.
    pub fn inject(&self, endpoint: &str, bytes: Vec<u8>) {
        let (tx, _) = self.mailbox(endpoint);
        let _ = tx.send(bytes);
    }

    /// Pop one delivered unit from `endpoint`'s mailbox, if any.
    pub fn take(&self, endpoint: &str) -> Option<Vec<u8>> {
        let (_, rx) = self.mailbox(endpoint);
        rx.try_recv().ok()
    }
}

pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    rx: Receiver<Vec<u8>>,
}

impl Transport for MemoryTransport {
    fn connect(&mut self, _peer: &Peer) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, peer: &Peer, unit: &[u8]) -> Result<(), TransportError> {
        self.hub.inject(&peer.addr.endpoint(), unit.to_vec());
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.try_recv().ok())
    }

    fn close(&mut self) {}
}
