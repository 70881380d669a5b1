//! Stream backend: framed TCP. Outbound connections are dialed per peer and
//! reused; inbound connections are accepted non-blocking and reassembled with
//! the codec's length prefix.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};

use tracing::warn;

use crate::frame::NodeId;
use crate::peer::Peer;
use crate::transport::{Poisoned, Reassembly, Transport, TransportError};

struct InboundConn {
    stream: TcpStream,
    rx: Reassembly,
    closed: bool,
}

pub struct StreamTransport {
    listener: TcpListener,
    outbound: HashMap<NodeId, TcpStream>,
    inbound: Vec<InboundConn>,
    read_buf: Vec<u8>,
}

impl StreamTransport {
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(endpoint).map_err(|source| TransportError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            outbound: HashMap::new(),
            inbound: Vec::new(),
            read_buf: vec![0u8; 4096],
        })
    }

    /// Port actually bound, useful after binding port 0.
    pub fn local_port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or_default()
    }

    fn dial(peer: &Peer) -> Result<TcpStream, TransportError> {
        let endpoint = peer.addr.endpoint();
        let stream = TcpStream::connect(&endpoint).map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    self.inbound.push(InboundConn {
                        stream,
                        rx: Reassembly::default(),
                        closed: false,
                    });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn buffered_unit(&mut self) -> Option<Vec<u8>> {
        for conn in &mut self.inbound {
            match conn.rx.next_unit() {
                Ok(Some(unit)) => return Some(unit),
                Ok(None) => {}
                Err(Poisoned) => {
                    // No unit boundary remains on this connection; drop it
                    // and let the peer redial at a clean one.
                    warn!("dropping inbound connection with undecodable framing");
                    conn.closed = true;
                }
            }
        }
        None
    }
}

impl Transport for StreamTransport {
    fn connect(&mut self, peer: &Peer) -> Result<(), TransportError> {
        if !self.outbound.contains_key(&peer.id) {
            let stream = Self::dial(peer)?;
            self.outbound.insert(peer.id, stream);
        }
        Ok(())
    }

    fn send(&mut self, peer: &Peer, unit: &[u8]) -> Result<(), TransportError> {
        self.connect(peer)?;
        let result = match self.outbound.get_mut(&peer.id) {
            Some(stream) => stream.write_all(unit).map_err(TransportError::Send),
            None => Ok(()),
        };
        if result.is_err() {
            // A broken connection is forgotten; the next send redials.
            self.outbound.remove(&peer.id);
        }
        result
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if let Some(unit) = self.buffered_unit() {
            self.inbound.retain(|c| !c.closed);
            return Ok(Some(unit));
        }
        self.accept_pending();
        for conn in &mut self.inbound {
            match conn.stream.read(&mut self.read_buf) {
                Ok(0) => conn.closed = true,
                Ok(n) => conn.rx.feed(&self.read_buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => conn.closed = true,
            }
        }
        let unit = self.buffered_unit();
        self.inbound.retain(|c| !c.closed);
        Ok(unit)
    }

    fn close(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerAddr;
    use crate::wire::{decode_frame, encode_frame, WireMessage};
    use std::time::{Duration, Instant};

    fn peer_at(port: u16) -> Peer {
        Peer {
            id: NodeId(1),
            addr: PeerAddr {
                address: "127.0.0.1".into(),
                port,
            },
            active: true,
            last_heartbeat: 0,
        }
    }

    fn poll_until(t: &mut StreamTransport) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(unit) = t.poll_receive().unwrap() {
                return unit;
            }
            assert!(Instant::now() < deadline, "unit never arrived");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn back_to_back_units_arrive_separately() {
        let mut a = StreamTransport::bind("127.0.0.1:0").unwrap();
        let mut b = StreamTransport::bind("127.0.0.1:0").unwrap();
        let peer = peer_at(b.local_port());

        let m1 = WireMessage::Heartbeat {
            sender: NodeId(0),
            timestamp_ms: 1,
        };
        let m2 = WireMessage::HeartbeatAck {
            sender: NodeId(0),
            timestamp_ms: 2,
        };
        a.send(&peer, &encode_frame(&m1).unwrap()).unwrap();
        a.send(&peer, &encode_frame(&m2).unwrap()).unwrap();

        let (d1, _) = decode_frame(&poll_until(&mut b)).unwrap();
        let (d2, _) = decode_frame(&poll_until(&mut b)).unwrap();
        assert_eq!(d1, m1);
        assert_eq!(d2, m2);
    }

    #[test]
    fn corrupt_prefix_drops_connection_and_redial_recovers() {
        let mut b = StreamTransport::bind("127.0.0.1:0").unwrap();
        let peer = peer_at(b.local_port());

        // A sender whose framing goes bad mid-stream: a bogus length prefix
        // followed by units that would otherwise be valid.
        let mut bad = TcpStream::connect(("127.0.0.1", b.local_port())).unwrap();
        bad.write_all(&u32::MAX.to_le_bytes()).unwrap();
        bad.write_all(&[0xAA, 0xBB]).unwrap();
        for tag in 0..5u8 {
            let m = WireMessage::Heartbeat {
                sender: NodeId(tag),
                timestamp_ms: tag as u64,
            };
            bad.write_all(&encode_frame(&m).unwrap()).unwrap();
        }

        // Nothing after the corrupt prefix is deliverable; the connection is
        // dropped rather than left desynchronized.
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            assert!(b.poll_receive().unwrap().is_none());
            std::thread::sleep(Duration::from_millis(1));
        }

        // A fresh connection starts at a unit boundary and gets through.
        let mut a = StreamTransport::bind("127.0.0.1:0").unwrap();
        let m = WireMessage::Heartbeat {
            sender: NodeId(7),
            timestamp_ms: 7,
        };
        a.send(&peer, &encode_frame(&m).unwrap()).unwrap();
        let (decoded, _) = decode_frame(&poll_until(&mut b)).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn connect_to_dead_endpoint_reports_error() {
        let mut a = StreamTransport::bind("127.0.0.1:0").unwrap();
        // A port nothing listens on; bind-then-drop guarantees it was free.
        let dead = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = dead.local_addr().unwrap().port();
        drop(dead);
        assert!(matches!(
            a.connect(&peer_at(port)),
            Err(TransportError::Connect { .. })
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let mut a = StreamTransport::bind("127.0.0.1:0").unwrap();
        a.close();
        a.close();
        assert!(a.poll_receive().unwrap().is_none());
    }
}
