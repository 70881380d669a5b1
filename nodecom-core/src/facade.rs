//! Driver facade: the blocking-looking Send/Receive surface the host
//! application sees. Internally both calls are queue operations; the host's
//! legacy contract (fixed node count, immediately-resolving poll) is
//! preserved without it ever touching the delivery machinery.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Shared;
use crate::error::NetError;
use crate::frame::{Frame, NodeId, MAX_PAYLOAD};

/// Handle for the host side. Cheap to clone-by-construction: ask the engine
/// for as many as needed.
pub struct NetDriver {
    shared: Arc<Shared>,
    receive_wait: Duration,
}

impl NetDriver {
    pub(crate) fn new(shared: Arc<Shared>, receive_wait: Duration) -> Self {
        Self {
            shared,
            receive_wait,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.shared.local
    }

    /// Enqueue one outbound frame. Fails fast: `PayloadTooLarge` for frames
    /// over the driver's packet size, `NoRoute` when neither the recipient
    /// nor any fallback is reachable (checked here so the frame is never
    /// silently dropped later), `QueueFull` under backpressure.
    pub fn send(&self, payload: &[u8], recipient: NodeId) -> Result<(), NetError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(NetError::PayloadTooLarge(payload.len()));
        }
        self.shared
            .peers
            .lock()
            .resolve(recipient, self.shared.redundancy)
            .map(|_| ())?;
        let frame = Frame::new(payload.to_vec(), self.shared.local, recipient);
        self.shared.outbound.push(frame)
    }

    /// Pop one inbound frame, waiting at most the configured bound. `None`
    /// maps to the host's "no packet" case.
    pub fn receive(&self) -> Option<(Vec<u8>, NodeId)> {
        let frame = if self.receive_wait.is_zero() {
            self.shared.inbound.try_pop()
        } else {
            self.shared.inbound.pop(self.receive_wait)
        }?;
        Some((frame.payload, frame.sender))
    }
}
