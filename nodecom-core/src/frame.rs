//! Node identity and the message unit moved through the engine's queues.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Maximum nodes in a session, matching the legacy driver's fixed table.
pub const MAX_NODES: usize = 8;

/// Maximum payload per frame in bytes, matching the legacy driver's packet size.
pub const MAX_PAYLOAD: usize = 512;

/// Node identifier: a small fixed integer assigned by configuration order.
/// Independent of network addresses; the peer table maps one to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One opaque message unit plus routing metadata. Owned exclusively by the
/// queue that currently holds it; moved, never cloned, across queue
/// boundaries.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub sender: NodeId,
    pub recipient: NodeId,
    pub timestamp_ms: u64,
}

impl Frame {
    /// Build a frame stamped with the current wall clock.
    pub fn new(payload: Vec<u8>, sender: NodeId, recipient: NodeId) -> Self {
        Self {
            payload,
            sender,
            recipient,
            timestamp_ms: now_ms(),
        }
    }
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
