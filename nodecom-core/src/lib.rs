//! nodecom: a transport-agnostic peer-messaging engine that emulates a
//! legacy fixed-node-count network driver. The host sees blocking-looking
//! Send/Receive; internally frames move through bounded queues, a pluggable
//! transport and a liveness monitor that reroutes around dead peers.

pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod frame;
pub mod peer;
pub mod queue;
pub mod transport;
pub mod wire;

pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineHandle};
pub use error::NetError;
pub use facade::NetDriver;
pub use frame::{Frame, NodeId, MAX_NODES, MAX_PAYLOAD};
pub use peer::{Peer, PeerAddr, PeerEvent, PeerState};
pub use queue::FrameQueue;
pub use transport::{Transport, TransportError, TransportKind};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, WireMessage};
