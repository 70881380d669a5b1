//! Peer table: addresses, liveness state and reroute selection.
//!
//! Time is counted in engine ticks, not wall clock, so the same logic runs
//! under a dedicated liveness thread and under cooperative scheduling. A peer
//! is demoted after `timeout_ticks` without proof of life and reactivated by
//! the next heartbeat response; entries are never removed during a session.

use serde::{Deserialize, Serialize};

use crate::error::NetError;
use crate::frame::NodeId;

/// Default ticks without proof of life before a peer is demoted.
pub const DEFAULT_PEER_TIMEOUT_TICKS: u64 = 10;

/// Default ticks between heartbeat rounds. Shorter than the timeout so at
/// least one probe precedes any demotion.
pub const DEFAULT_HEARTBEAT_INTERVAL_TICKS: u64 = 5;

/// Network location of a peer, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    pub address: String,
    pub port: u16,
}

impl PeerAddr {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Liveness state of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Active,
    Inactive,
}

/// One known remote node. Created at configuration time and kept for the
/// whole session; only the liveness bookkeeping mutates it.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    pub addr: PeerAddr,
    pub active: bool,
    pub last_heartbeat: u64,
}

impl Peer {
    pub fn state(&self) -> PeerState {
        if self.active {
            PeerState::Active
        } else {
            PeerState::Inactive
        }
    }
}

/// A state transition, reported as a structured observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEvent {
    pub peer: NodeId,
    pub old: PeerState,
    pub new: PeerState,
    pub tick: u64,
}

/// All peers of the session, in table (node id) order, local entry included.
pub struct PeerTable {
    local: NodeId,
    peers: Vec<Peer>,
    timeout_ticks: u64,
}

impl PeerTable {
    /// Build from configured entries. Duplicate ids keep the first entry, so
    /// the at-most-one-entry-per-id invariant holds from construction on.
    pub fn new(local: NodeId, entries: Vec<(NodeId, PeerAddr)>, timeout_ticks: u64) -> Self {
        let mut peers: Vec<Peer> = Vec::with_capacity(entries.len());
        for (id, addr) in entries {
            if peers.iter().any(|p| p.id == id) {
                continue;
            }
            peers.push(Peer {
                id,
                addr,
                active: true,
                last_heartbeat: 0,
            });
        }
        Self {
            local,
            peers,
            timeout_ticks,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    pub fn get(&self, id: NodeId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Remote peers in table order (local entry skipped).
    pub fn remotes(&self) -> impl Iterator<Item = &Peer> {
        let local = self.local;
        self.peers.iter().filter(move |p| p.id != local)
    }

    /// Destination resolution for one frame. With redundancy, an inactive
    /// recipient is substituted by the next active remote in table order
    /// (single-step reroute); no active remote at all is `NoRoute`. Without
    /// redundancy the configured recipient is used as-is.
    pub fn resolve(&self, recipient: NodeId, redundancy: bool) -> Result<&Peer, NetError> {
        let pos = self
            .peers
            .iter()
            .position(|p| p.id == recipient && p.id != self.local)
            .ok_or(NetError::NoRoute(recipient))?;
        let peer = &self.peers[pos];
        if !redundancy || peer.active {
            return Ok(peer);
        }
        // Scan forward from the recipient, wrapping once around the table.
        for off in 1..self.peers.len() {
            let candidate = &self.peers[(pos + off) % self.peers.len()];
            if candidate.id != self.local && candidate.active {
                return Ok(candidate);
            }
        }
        Err(NetError::NoRoute(recipient))
    }

    /// Record proof of life at `tick`. Returns the reactivation event if the
    /// peer was inactive.
    pub fn observe(&mut self, id: NodeId, tick: u64) -> Option<PeerEvent> {
        let local = self.local;
        let peer = self.peers.iter_mut().find(|p| p.id == id && p.id != local)?;
        peer.last_heartbeat = tick;
        if peer.active {
            return None;
        }
        peer.active = true;
        Some(PeerEvent {
            peer: id,
            old: PeerState::Inactive,
            new: PeerState::Active,
            tick,
        })
    }

    /// Demote every active remote whose window has elapsed. Each demotion is
    /// returned exactly once.
    pub fn check_timeouts(&mut self, tick: u64) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        for peer in &mut self.peers {
            if peer.id == self.local || !peer.active {
                continue;
            }
            if tick.saturating_sub(peer.last_heartbeat) >= self.timeout_ticks {
                peer.active = false;
                events.push(PeerEvent {
                    peer: peer.id,
                    old: PeerState::Active,
                    new: PeerState::Inactive,
                    tick,
                });
            }
        }
        events
    }

    /// Snapshot of (id, state) for every remote, in table order.
    pub fn states(&self) -> Vec<(NodeId, PeerState)> {
        self.remotes().map(|p| (p.id, p.state())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> PeerAddr {
        PeerAddr {
            address: "127.0.0.1".into(),
            port,
        }
    }

    fn table3() -> PeerTable {
        // Local node 0 plus remotes 1 and 2.
        PeerTable::new(
            NodeId(0),
            vec![
                (NodeId(0), addr(9000)),
                (NodeId(1), addr(9001)),
                (NodeId(2), addr(9002)),
            ],
            DEFAULT_PEER_TIMEOUT_TICKS,
        )
    }

    #[test]
    fn duplicate_ids_keep_first_entry() {
        let t = PeerTable::new(
            NodeId(0),
            vec![(NodeId(1), addr(9001)), (NodeId(1), addr(9999))],
            10,
        );
        assert_eq!(t.get(NodeId(1)).unwrap().addr.port, 9001);
        assert_eq!(t.remotes().count(), 1);
    }

    #[test]
    fn resolve_active_recipient_directly() {
        let t = table3();
        assert_eq!(t.resolve(NodeId(2), true).unwrap().id, NodeId(2));
    }

    #[test]
    fn resolve_never_picks_local() {
        let t = table3();
        assert!(matches!(
            t.resolve(NodeId(0), true),
            Err(NetError::NoRoute(NodeId(0)))
        ));
    }

    #[test]
    fn demotion_happens_exactly_once() {
        let mut t = table3();
        t.observe(NodeId(1), 1);
        let events = t.check_timeouts(11);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].peer, NodeId(2));
        assert_eq!(events[0].old, PeerState::Active);
        assert_eq!(events[0].new, PeerState::Inactive);
        // Already inactive: no second demotion event.
        assert!(t.check_timeouts(20).iter().all(|e| e.peer != NodeId(2)));
    }

    #[test]
    fn inactive_peer_rerouted_to_next_active() {
        let mut t = table3();
        t.observe(NodeId(1), 5);
        t.check_timeouts(11); // demotes peer 2
        let routed = t.resolve(NodeId(2), true).unwrap();
        assert_eq!(routed.id, NodeId(1));
    }

    #[test]
    fn no_active_peer_is_no_route() {
        let mut t = table3();
        t.check_timeouts(11); // demotes both remotes
        assert!(matches!(
            t.resolve(NodeId(2), true),
            Err(NetError::NoRoute(NodeId(2)))
        ));
    }

    #[test]
    fn redundancy_off_ignores_liveness() {
        let mut t = table3();
        t.check_timeouts(11);
        assert_eq!(t.resolve(NodeId(2), false).unwrap().id, NodeId(2));
    }

    #[test]
    fn reactivation_on_observe() {
        let mut t = table3();
        t.check_timeouts(11);
        let ev = t.observe(NodeId(2), 15).unwrap();
        assert_eq!(ev.old, PeerState::Inactive);
        assert_eq!(ev.new, PeerState::Active);
        assert_eq!(t.resolve(NodeId(2), true).unwrap().id, NodeId(2));
        // A second observation of an active peer reports nothing.
        assert!(t.observe(NodeId(2), 16).is_none());
    }
}
