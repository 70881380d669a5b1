//! RPC-style backend: one unary call per send. The caller writes a single
//! unit and half-closes; the callee acks each completed call but the caller
//! never waits for it, since the engine's semantics are send-then-poll, not
//! send-then-wait. The callee side is a non-blocking listener.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::peer::Peer;
use crate::transport::{Poisoned, Reassembly, Transport, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const ACK_BYTE: u8 = 0x06;

struct PendingCall {
    stream: TcpStream,
    rx: Reassembly,
    closed: bool,
}

pub struct RpcTransport {
    listener: TcpListener,
    calls: Vec<PendingCall>,
    read_buf: Vec<u8>,
}

impl RpcTransport {
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
            calls: Vec::new(),
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
}

impl Transport for RpcTransport {
    fn connect(&mut self, _peer: &Peer) -> Result<(), TransportError> {
        // Calls dial per send; there is no persistent channel to set up.
        Ok(())
    }

    fn send(&mut self, peer: &Peer, unit: &[u8]) -> Result<(), TransportError> {
        let endpoint = peer.addr.endpoint();
        let addr = endpoint
            .to_socket_addrs()
            .ok()
            .and_then(|mut a| a.next())
            .ok_or_else(|| TransportError::BadEndpoint(endpoint.clone()))?;
        let mut stream =
            TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|source| {
                TransportError::Connect {
                    endpoint: endpoint.clone(),
                    source,
                }
            })?;
        let _ = stream.set_nodelay(true);
        stream.write_all(unit).map_err(TransportError::Send)?;
        // Fire-and-forget: half-close marks the end of the call and the ack
        // is never awaited. A stalled callee costs nothing here.
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    self.calls.push(PendingCall {
                        stream,
                        rx: Reassembly::default(),
                        closed: false,
                    });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        let mut completed = None;
        for call in &mut self.calls {
            match call.stream.read(&mut self.read_buf) {
                Ok(0) => call.closed = true,
                Ok(n) => call.rx.feed(&self.read_buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => call.closed = true,
            }
            match call.rx.next_unit() {
                Ok(Some(unit)) => {
                    let _ = call.stream.write_all(&[ACK_BYTE]);
                    call.closed = true;
                    completed = Some(unit);
                    break;
                }
                Ok(None) => {}
                // Undecodable call; drop it without an ack.
                Err(Poisoned) => call.closed = true,
            }
        }
        self.calls.retain(|c| !c.closed);
        Ok(completed)
    }

    fn close(&mut self) {
        self.calls.clear();
    }
}
