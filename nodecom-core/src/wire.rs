//! Framing: length-prefix (4 bytes LE) + bincode payload.
//!
//! The engine treats encoded units as opaque bytes; transports carry them
//! whole (datagram, RPC call) or use the length prefix to delimit them on a
//! byte stream.

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, NodeId};

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 4096; // 512-byte payload plus metadata headroom

/// On-wire message types. Heartbeats are control-plane traffic, kept
/// distinct from data frames rather than encoded as marker payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// One host data frame: payload plus routing metadata.
    Data {
        sender: NodeId,
        recipient: NodeId,
        timestamp_ms: u64,
        payload: Vec<u8>,
    },
    /// Liveness probe, answered with `HeartbeatAck`.
    Heartbeat { sender: NodeId, timestamp_ms: u64 },
    /// Proof of liveness; reactivates a demoted peer.
    HeartbeatAck { sender: NodeId, timestamp_ms: u64 },
}

impl WireMessage {
    pub fn from_frame(frame: Frame) -> Self {
        WireMessage::Data {
            sender: frame.sender,
            recipient: frame.recipient,
            timestamp_ms: frame.timestamp_ms,
            payload: frame.payload,
        }
    }

    /// Extract the data frame; `None` for control-plane messages.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            WireMessage::Data {
                sender,
                recipient,
                timestamp_ms,
                payload,
            } => Some(Frame {
                payload,
                sender,
                recipient,
                timestamp_ms,
            }),
            _ => None,
        }
    }
}

/// Encode a message into a single unit: 4 bytes LE length + bincode payload.
pub fn encode_frame(msg: &WireMessage) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(msg).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding a message into a unit (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one unit from the front of `bytes`. Returns the message and the
/// number of bytes consumed. Call with a partial buffer; `NeedMore` means the
/// caller should try again after more data.
pub fn decode_frame(bytes: &[u8]) -> Result<(WireMessage, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg: WireMessage =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((msg, LEN_SIZE + len))
}

/// Error decoding a unit (need more bytes, too large, or bincode failure).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

/// Number of bytes in the length prefix. Stream transports use this to
/// delimit units without decoding them.
pub(crate) const PREFIX_SIZE: usize = LEN_SIZE;

/// Max on-wire unit size, prefix excluded.
pub(crate) const MAX_UNIT_LEN: usize = MAX_FRAME_LEN as usize;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> WireMessage {
        WireMessage::Data {
            sender: NodeId(0),
            recipient: NodeId(3),
            timestamp_ms: 12345,
            payload: b"tic".to_vec(),
        }
    }

    #[test]
    fn roundtrip_data() {
        let msg = sample_data();
        let unit = encode_frame(&msg).unwrap();
        let (decoded, n) = decode_frame(&unit).unwrap();
        assert_eq!(n, unit.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn data_fields_survive_frame_conversion() {
        let frame = Frame {
            payload: vec![1, 2, 3],
            sender: NodeId(1),
            recipient: NodeId(2),
            timestamp_ms: 99,
        };
        let unit = encode_frame(&WireMessage::from_frame(frame)).unwrap();
        let (msg, _) = decode_frame(&unit).unwrap();
        let back = msg.into_frame().unwrap();
        assert_eq!(back.payload, vec![1, 2, 3]);
        assert_eq!(back.sender, NodeId(1));
        assert_eq!(back.recipient, NodeId(2));
        assert_eq!(back.timestamp_ms, 99);
    }

    #[test]
    fn partial_read_need_more() {
        let unit = encode_frame(&sample_data()).unwrap();
        assert!(matches!(
            decode_frame(&unit[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&unit[..LEN_SIZE]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_messages() {
        let a = sample_data();
        let b = WireMessage::Heartbeat {
            sender: NodeId(5),
            timestamp_ms: 7,
        };
        let fa = encode_frame(&a).unwrap();
        let fb = encode_frame(&b).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert!(matches!(m1, WireMessage::Data { .. }));
        assert!(matches!(m2, WireMessage::Heartbeat { .. }));
    }

    #[test]
    fn heartbeat_is_not_a_frame() {
        let hb = WireMessage::Heartbeat {
            sender: NodeId(0),
            timestamp_ms: 1,
        };
        assert!(hb.into_frame().is_none());
    }

    #[test]
    fn oversized_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_le_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        assert!(matches!(decode_frame(&buf), Err(FrameDecodeError::TooLarge)));
    }
}
