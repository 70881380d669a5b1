//! The engine: delivery loop, liveness monitor and the two scheduling modes.
//!
//! All loop logic lives in two free functions over the shared state,
//! `delivery_tick` and `liveness_tick`. Cooperative platforms call
//! `Engine::step` from their own scheduler; threaded platforms call
//! `Engine::start`, which wraps the same ticks in two dedicated threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::NetError;
use crate::facade::NetDriver;
use crate::frame::{now_ms, NodeId};
use crate::peer::{Peer, PeerEvent, PeerState, PeerTable};
use crate::queue::FrameQueue;
use crate::transport::{self, Transport};
use crate::wire::{self, WireMessage};

/// Cross-component shared state: the two queues, the peer table and the
/// transport. Nothing else is shared; the peer table is written only by
/// liveness bookkeeping and read by destination resolution.
pub(crate) struct Shared {
    pub(crate) local: NodeId,
    pub(crate) redundancy: bool,
    pub(crate) outbound: FrameQueue,
    pub(crate) inbound: FrameQueue,
    pub(crate) peers: Mutex<PeerTable>,
    pub(crate) transport: Mutex<Box<dyn Transport>>,
    pub(crate) running: AtomicBool,
    pub(crate) tick: AtomicU64,
}

fn log_transition(ev: &PeerEvent) {
    info!(
        peer = %ev.peer,
        old = ?ev.old,
        new = ?ev.new,
        tick = ev.tick,
        "peer state transition"
    );
}

/// One delivery step: at most one outbound frame out, at most one inbound
/// unit in. Transport and decode failures are one missed delivery each,
/// logged and absorbed.
fn delivery_tick(shared: &Shared) {
    if let Some(frame) = shared.outbound.try_pop() {
        let recipient = frame.recipient;
        let routed = shared
            .peers
            .lock()
            .resolve(recipient, shared.redundancy)
            .map(Peer::clone);
        match routed {
            Ok(peer) => {
                if peer.id != recipient {
                    debug!(%recipient, via = %peer.id, "rerouting to next active peer");
                }
                match wire::encode_frame(&WireMessage::from_frame(frame)) {
                    Ok(unit) => {
                        if let Err(error) = shared.transport.lock().send(&peer, &unit) {
                            warn!(peer = %peer.id, %error, "send failed");
                        }
                    }
                    Err(error) => warn!(%error, "frame encode failed"),
                }
            }
            // The peer table changed between enqueue and delivery.
            Err(error) => warn!(%recipient, %error, "dropping undeliverable frame"),
        }
    }

    let polled = shared.transport.lock().poll_receive();
    match polled {
        Ok(Some(unit)) => match wire::decode_frame(&unit) {
            Ok((msg, _)) => handle_inbound(shared, msg),
            Err(error) => warn!(%error, "discarding malformed unit"),
        },
        Ok(None) => {}
        Err(error) => warn!(%error, "transport receive failed"),
    }
}

fn handle_inbound(shared: &Shared, msg: WireMessage) {
    let tick = shared.tick.load(Ordering::Relaxed);
    match msg {
        data @ WireMessage::Data { .. } => {
            if let Some(frame) = data.into_frame() {
                let sender = frame.sender;
                if shared.inbound.push(frame).is_err() {
                    warn!(%sender, "inbound queue full, dropping frame");
                }
            }
        }
        WireMessage::Heartbeat { sender, .. } => {
            let (event, peer) = {
                let mut peers = shared.peers.lock();
                let event = peers.observe(sender, tick);
                (event, peers.get(sender).map(Peer::clone))
            };
            if let Some(ev) = event {
                log_transition(&ev);
            }
            let Some(peer) = peer else { return };
            match wire::encode_frame(&WireMessage::HeartbeatAck {
                sender: shared.local,
                timestamp_ms: now_ms(),
            }) {
                Ok(unit) => {
                    if let Err(error) = shared.transport.lock().send(&peer, &unit) {
                        debug!(peer = %peer.id, %error, "heartbeat ack failed");
                    }
                }
                Err(error) => warn!(%error, "heartbeat ack encode failed"),
            }
        }
        WireMessage::HeartbeatAck { sender, .. } => {
            if let Some(ev) = shared.peers.lock().observe(sender, tick) {
                log_transition(&ev);
            }
        }
    }
}

/// One liveness round: demote peers whose window elapsed, then probe every
/// remote (inactive ones included, so they can recover).
fn liveness_tick(shared: &Shared, tick: u64) {
    let (events, remotes) = {
        let mut peers = shared.peers.lock();
        let events = peers.check_timeouts(tick);
        let remotes: Vec<Peer> = peers.remotes().map(Peer::clone).collect();
        (events, remotes)
    };
    for ev in &events {
        log_transition(ev);
    }
    let probe = match wire::encode_frame(&WireMessage::Heartbeat {
        sender: shared.local,
        timestamp_ms: now_ms(),
    }) {
        Ok(unit) => unit,
        Err(error) => {
            warn!(%error, "heartbeat encode failed");
            return;
        }
    };
    for peer in &remotes {
        if let Err(error) = shared.transport.lock().send(peer, &probe) {
            debug!(peer = %peer.id, %error, "heartbeat send failed");
        }
    }
}

/// The messaging engine. Constructed once, explicitly owned: run it either
/// cooperatively (`step` per external scheduler tick) or threaded (`start`).
pub struct Engine {
    shared: Arc<Shared>,
    heartbeat_interval: u64,
    tick_interval: Duration,
    receive_wait: Duration,
    last_liveness: u64,
    closed: bool,
}

impl Engine {
    /// Build the engine over the configured backend. A transport bind
    /// failure fails construction outright: the host cannot operate without
    /// a working transport, so no degraded engine ever starts.
    pub fn new(config: &Config) -> Result<Self, NetError> {
        config.validate()?;
        let transport = transport::create(config.transport, &config.bind_endpoint())?;
        Self::with_transport(config, transport)
    }

    /// Build over a caller-supplied transport (simulation, tests).
    pub fn with_transport(
        config: &Config,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self, NetError> {
        config.validate()?;
        let peers = PeerTable::new(
            config.local_id(),
            config.peer_entries(),
            config.peer_timeout_ticks,
        );
        // Eager dial where the backend keeps connections; a peer that is not
        // up yet is redialed on first send.
        for peer in peers.remotes() {
            if let Err(error) = transport.connect(peer) {
                debug!(peer = %peer.id, %error, "initial connect failed");
            }
        }
        let shared = Arc::new(Shared {
            local: config.local_id(),
            redundancy: config.redundancy_enabled,
            outbound: FrameQueue::bounded(config.queue_capacity),
            inbound: FrameQueue::bounded(config.queue_capacity),
            peers: Mutex::new(peers),
            transport: Mutex::new(transport),
            running: AtomicBool::new(false),
            tick: AtomicU64::new(0),
        });
        Ok(Self {
            shared,
            heartbeat_interval: config.heartbeat_interval_ticks,
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            receive_wait: Duration::from_millis(config.receive_wait_ms),
            last_liveness: 0,
            closed: false,
        })
    }

    /// Host-side handle; any number may coexist.
    pub fn driver(&self) -> NetDriver {
        NetDriver::new(self.shared.clone(), self.receive_wait)
    }

    pub fn local_id(&self) -> NodeId {
        self.shared.local
    }

    /// Snapshot of remote liveness states, in table order.
    pub fn peer_states(&self) -> Vec<(NodeId, PeerState)> {
        self.shared.peers.lock().states()
    }

    /// One cooperative tick: a delivery step plus a liveness check throttled
    /// by the engine's own tick counter. Never blocks.
    pub fn step(&mut self) {
        if self.closed {
            return;
        }
        let tick = self.shared.tick.fetch_add(1, Ordering::Relaxed) + 1;
        delivery_tick(&self.shared);
        if self.shared.redundancy
            && tick.saturating_sub(self.last_liveness) >= self.heartbeat_interval
        {
            self.last_liveness = tick;
            liveness_tick(&self.shared, tick);
        }
    }

    /// Cooperative teardown: release transport resources. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.transport.lock().close();
    }

    /// Threaded mode: the delivery loop and the liveness monitor each run on
    /// a dedicated thread until shutdown. The returned handle owns both
    /// threads; dropping it tears the engine down.
    pub fn start(mut self) -> EngineHandle {
        self.shared.running.store(true, Ordering::SeqCst);
        let mut threads = Vec::new();

        let delivery_shared = self.shared.clone();
        let tick_interval = self.tick_interval;
        threads.push(thread::spawn(move || {
            while delivery_shared.running.load(Ordering::SeqCst) {
                delivery_shared.tick.fetch_add(1, Ordering::Relaxed);
                delivery_tick(&delivery_shared);
                thread::sleep(tick_interval);
            }
        }));

        if self.shared.redundancy {
            let liveness_shared = self.shared.clone();
            let heartbeat_interval = self.heartbeat_interval;
            threads.push(thread::spawn(move || {
                while liveness_shared.running.load(Ordering::SeqCst) {
                    // Sleep in tick-sized slices so shutdown is observed
                    // within one tick.
                    for _ in 0..heartbeat_interval {
                        if !liveness_shared.running.load(Ordering::SeqCst) {
                            return;
                        }
                        thread::sleep(tick_interval);
                    }
                    let tick = liveness_shared.tick.load(Ordering::Relaxed);
                    liveness_tick(&liveness_shared, tick);
                }
            }));
        }

        // Teardown now belongs to the handle.
        self.closed = true;
        EngineHandle {
            shared: self.shared.clone(),
            receive_wait: self.receive_wait,
            threads,
            closed: false,
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owner of a running threaded engine. No thread outlives the handle.
pub struct EngineHandle {
    shared: Arc<Shared>,
    receive_wait: Duration,
    threads: Vec<JoinHandle<()>>,
    closed: bool,
}

impl EngineHandle {
    pub fn driver(&self) -> NetDriver {
        NetDriver::new(self.shared.clone(), self.receive_wait)
    }

    pub fn peer_states(&self) -> Vec<(NodeId, PeerState)> {
        self.shared.peers.lock().states()
    }

    /// Stop both loops, join them, then release the transport. Calling this
    /// twice is the same as calling it once: threads are joined at most once
    /// and the transport is closed at most once.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
        if !self.closed {
            self.closed = true;
            self.shared.transport.lock().close();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
