//! Engine configuration: transport choice, local binding, the node table and
//! liveness tuning. Loaded by the daemon from TOML; every field has a default
//! so a file only states what it overrides.

use serde::Deserialize;

use crate::frame::{NodeId, MAX_NODES};
use crate::peer::{PeerAddr, DEFAULT_HEARTBEAT_INTERVAL_TICKS, DEFAULT_PEER_TIMEOUT_TICKS};
use crate::transport::TransportKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Backend to bind; fixed for the engine's lifetime.
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Local bind address (default 127.0.0.1).
    #[serde(default = "default_host_address")]
    pub host_address: String,
    /// Local bind port (default 50051).
    #[serde(default = "default_port")]
    pub port: u16,
    /// This node's id; selects the local entry of `peers`.
    #[serde(default)]
    pub node_id: u8,
    /// Full node table in id order, local entry included.
    #[serde(default)]
    pub peers: Vec<PeerAddr>,
    /// Heartbeats, demotion and reroute; off means sends always go to the
    /// configured recipient.
    #[serde(default = "default_true")]
    pub redundancy_enabled: bool,
    /// Capacity of each frame queue (default 64).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_heartbeat_interval_ticks")]
    pub heartbeat_interval_ticks: u64,
    #[serde(default = "default_peer_timeout_ticks")]
    pub peer_timeout_ticks: u64,
    /// Delivery tick cadence in threaded mode (default 1 ms).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Bounded wait inside `NetDriver::receive` (default 1 ms; 0 polls).
    #[serde(default = "default_receive_wait_ms")]
    pub receive_wait_ms: u64,
}

fn default_transport() -> TransportKind {
    TransportKind::Rpc
}
fn default_host_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    50051
}
fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    64
}
fn default_heartbeat_interval_ticks() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_TICKS
}
fn default_peer_timeout_ticks() -> u64 {
    DEFAULT_PEER_TIMEOUT_TICKS
}
fn default_tick_interval_ms() -> u64 {
    1
}
fn default_receive_wait_ms() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host_address: default_host_address(),
            port: default_port(),
            node_id: 0,
            peers: Vec::new(),
            redundancy_enabled: true,
            queue_capacity: default_queue_capacity(),
            heartbeat_interval_ticks: default_heartbeat_interval_ticks(),
            peer_timeout_ticks: default_peer_timeout_ticks(),
            tick_interval_ms: default_tick_interval_ms(),
            receive_wait_ms: default_receive_wait_ms(),
        }
    }
}

impl Config {
    pub fn bind_endpoint(&self) -> String {
        format!("{}:{}", self.host_address, self.port)
    }

    pub fn local_id(&self) -> NodeId {
        NodeId(self.node_id)
    }

    /// Node table entries in id order.
    pub fn peer_entries(&self) -> Vec<(NodeId, PeerAddr)> {
        self.peers
            .iter()
            .enumerate()
            .map(|(i, addr)| (NodeId(i as u8), addr.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.len() > MAX_NODES {
            return Err(ConfigError::TooManyNodes(self.peers.len()));
        }
        if (self.node_id as usize) >= self.peers.len() {
            return Err(ConfigError::NodeIdOutOfRange {
                node_id: self.node_id,
                nodes: self.peers.len(),
            });
        }
        if self.heartbeat_interval_ticks >= self.peer_timeout_ticks {
            return Err(ConfigError::HeartbeatNotShorter {
                interval: self.heartbeat_interval_ticks,
                timeout: self.peer_timeout_ticks,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} nodes configured, driver supports at most {MAX_NODES}")]
    TooManyNodes(usize),
    #[error("node_id {node_id} outside the {nodes}-entry node table")]
    NodeIdOutOfRange { node_id: u8, nodes: usize },
    #[error("heartbeat interval {interval} must be shorter than peer timeout {timeout}")]
    HeartbeatNotShorter { interval: u64, timeout: u64 },
    #[error("queue capacity must be nonzero")]
    ZeroQueueCapacity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            transport = "datagram"
            node_id = 1

            [[peers]]
            address = "10.0.0.1"
            port = 50051

            [[peers]]
            address = "10.0.0.2"
            port = 50051
            "#,
        )
        .unwrap();
        assert_eq!(cfg.transport, TransportKind::Datagram);
        assert_eq!(cfg.port, 50051);
        assert!(cfg.redundancy_enabled);
        assert_eq!(cfg.peer_timeout_ticks, 10);
        assert_eq!(cfg.heartbeat_interval_ticks, 5);
        cfg.validate().unwrap();
        assert_eq!(cfg.local_id(), NodeId(1));
        assert_eq!(cfg.peer_entries()[1].1.address, "10.0.0.2");
    }

    #[test]
    fn too_many_nodes_rejected() {
        let mut cfg = Config::default();
        cfg.peers = (0..9)
            .map(|i| PeerAddr {
                address: "10.0.0.1".into(),
                port: 50051 + i,
            })
            .collect();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooManyNodes(9))
        ));
    }

    #[test]
    fn node_id_must_index_table() {
        let mut cfg = Config::default();
        cfg.peers = vec![PeerAddr {
            address: "10.0.0.1".into(),
            port: 50051,
        }];
        cfg.node_id = 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NodeIdOutOfRange { node_id: 1, nodes: 1 })
        ));
    }

    #[test]
    fn heartbeat_must_beat_timeout() {
        let mut cfg = Config::default();
        cfg.peers = vec![PeerAddr {
            address: "10.0.0.1".into(),
            port: 50051,
        }];
        cfg.heartbeat_interval_ticks = 10;
        cfg.peer_timeout_ticks = 10;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::HeartbeatNotShorter { .. })
        ));
    }
}
