//! Bounded FIFO frame queue, one instance per direction.
//!
//! Push beyond capacity fails closed (reject-new): the caller sees
//! backpressure instead of a silent drop. Pop comes in a blocking flavor with
//! a timeout (threaded mode) and an immediate flavor (cooperative mode).

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::NetError;
use crate::frame::Frame;

/// Thread-safe bounded FIFO of frames. Clones share the same queue.
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl FrameQueue {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Append atomically, waking one waiting consumer. `QueueFull` when at
    /// capacity; the queued order is untouched.
    pub fn push(&self, frame: Frame) -> Result<(), NetError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            // The queue holds both channel ends, so the only reachable
            // failure is a full buffer.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                Err(NetError::QueueFull)
            }
        }
    }

    /// Block up to `timeout` for a frame.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Non-blocking pop, for cooperative ticks.
    pub fn try_pop(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::NodeId;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag], NodeId(0), NodeId(1))
    }

    #[test]
    fn fifo_order() {
        let q = FrameQueue::bounded(8);
        for tag in 0..3 {
            q.push(frame(tag)).unwrap();
        }
        for tag in 0..3 {
            assert_eq!(q.try_pop().unwrap().payload, vec![tag]);
        }
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn reject_new_when_full() {
        let q = FrameQueue::bounded(2);
        q.push(frame(0)).unwrap();
        q.push(frame(1)).unwrap();
        assert!(matches!(q.push(frame(2)), Err(NetError::QueueFull)));
        // Existing order survives the rejected push.
        assert_eq!(q.try_pop().unwrap().payload, vec![0]);
        assert_eq!(q.try_pop().unwrap().payload, vec![1]);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let q = FrameQueue::bounded(1);
        assert!(q.pop(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn pop_wakes_on_push_from_other_thread() {
        let q = FrameQueue::bounded(1);
        let q2 = q.clone();
        let t = std::thread::spawn(move || q2.pop(Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(10));
        q.push(frame(7)).unwrap();
        let got = t.join().unwrap();
        assert_eq!(got.unwrap().payload, vec![7]);
    }
}
