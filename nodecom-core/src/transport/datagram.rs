//! Datagram backend: one UDP socket, one encoded unit per datagram.

use std::io::ErrorKind;
use std::net::UdpSocket;

use crate::peer::Peer;
use crate::transport::{Transport, TransportError};
use crate::wire;

pub struct DatagramTransport {
    socket: UdpSocket,
    recv_buf: Vec<u8>,
}

impl DatagramTransport {
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(endpoint).map_err(|source| TransportError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self {
            socket,
            recv_buf: vec![0u8; wire::PREFIX_SIZE + wire::MAX_UNIT_LEN],
        })
    }
}

impl Transport for DatagramTransport {
    fn connect(&mut self, _peer: &Peer) -> Result<(), TransportError> {
        // Connectionless; nothing to set up.
        Ok(())
    }

    fn send(&mut self, peer: &Peer, unit: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send_to(unit, peer.addr.endpoint())
            .map_err(TransportError::Send)?;
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((n, _from)) => Ok(Some(self.recv_buf[..n].to_vec())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::Receive(e)),
        }
    }

    fn close(&mut self) {
        // The socket closes on drop; no per-peer state to release.
    }
}
