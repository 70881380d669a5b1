//! Engine error taxonomy surfaced at the driver boundary.

use crate::config::ConfigError;
use crate::frame::{NodeId, MAX_PAYLOAD};
use crate::transport::TransportError;
use crate::wire::{FrameDecodeError, FrameEncodeError};

/// Everything the facade or engine construction can report. Decode and
/// transport failures during delivery are logged and absorbed by the loop;
/// only construction-time failures are fatal.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Outbound queue at capacity; caller retries or drops.
    #[error("outbound queue full")]
    QueueFull,
    /// Destination and every fallback peer inactive.
    #[error("no active route to node {0}")]
    NoRoute(NodeId),
    /// Payload exceeds the driver's fixed packet size.
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte driver limit")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Encode(#[from] FrameEncodeError),
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
