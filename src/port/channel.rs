//! In-process port sink backed by tokio one-shot channels.
//!
//! Lets a Rust host drive the bridge without a Dart VM: `register` hands out a
//! port number together with the receiver that its single result arrives on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use log::warn;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::value::DartValue;
use super::{DartPort, PortSink};

pub struct ChannelSink {
    next_port: AtomicI64,
    pending: Mutex<HashMap<DartPort, oneshot::Sender<DartValue>>>,
    orphaned: AtomicUsize,
}

impl ChannelSink {
    pub fn new() -> Self {
        ChannelSink {
            next_port: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            orphaned: AtomicUsize::new(0),
        }
    }

    /// Allocates a port and the receiver its result will be delivered to.
    pub fn register(&self) -> (DartPort, oneshot::Receiver<DartValue>) {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(port, tx);
        (port, rx)
    }

    /// Number of posts that found no pending receiver (unknown or already
    /// completed ports).
    pub fn orphaned_posts(&self) -> usize {
        self.orphaned.load(Ordering::SeqCst)
    }

    pub fn pending_ports(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSink for ChannelSink {
    fn post(&self, port: DartPort, message: DartValue) -> bool {
        let Some(tx) = self.pending.lock().remove(&port) else {
            warn!("[ChannelSink] Post to unknown or completed port {}", port);
            self.orphaned.fetch_add(1, Ordering::SeqCst);
            return false;
        };
        // A dropped receiver means the caller stopped caring; that is not an error.
        tx.send(message).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_post_to_a_port_is_orphaned() {
        let sink = ChannelSink::new();
        let (port, mut rx) = sink.register();
        assert!(sink.post(port, DartValue::Null));
        assert!(!sink.post(port, DartValue::Null));
        assert_eq!(rx.try_recv().unwrap(), DartValue::Null);
        assert_eq!(sink.orphaned_posts(), 1);
        assert_eq!(sink.pending_ports(), 0);
    }

    #[test]
    fn late_result_for_abandoned_receiver_is_dropped() {
        let sink = ChannelSink::new();
        let (port, rx) = sink.register();
        drop(rx);
        assert!(!sink.post(port, DartValue::Bool(true)));
        assert_eq!(sink.orphaned_posts(), 0);
    }
}
