//! Fan-out of server messages to every live connection.
//!
//! Each connection owns a bounded outbound queue drained by its own writer
//! task (`framing::pump_outbound`). Publishing never waits: a full or closed
//! queue just loses that frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::net::protocol::{encode, ServerMessage};

/// Connection handle id, unique per process
pub type ConnectionId = u64;

/// Encoded message shared by every recipient
pub type Frame = Arc<[u8]>;

/// Counts from a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
    pub bytes: usize,
}

pub struct ConnectionSet {
    next_id: AtomicU64,
    queue_capacity: usize,
    outbound: RwLock<HashMap<ConnectionId, mpsc::Sender<Frame>>>,
}

impl ConnectionSet {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
            outbound: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection; the receiver feeds its writer task
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.outbound.write().insert(id, tx);
        debug!("Registered connection {}", id);
        (id, rx)
    }

    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.outbound.write().remove(&id).is_some();
        if removed {
            debug!("Unregistered connection {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.outbound.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a message for one connection
    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> Delivery {
        let Some(frame) = encode_frame(message) else {
            return Delivery::default();
        };
        let sender = self.outbound.read().get(&id).cloned();
        let mut delivery = Delivery::default();
        match sender {
            Some(sender) => deliver(id, &sender, &frame, &mut delivery),
            None => debug!("send_to: connection {} is gone", id),
        }
        delivery
    }

    /// Queue a message for every connection registered right now
    pub fn send_all(&self, message: &ServerMessage) -> Delivery {
        let Some(frame) = encode_frame(message) else {
            return Delivery::default();
        };

        let targets: Vec<(ConnectionId, mpsc::Sender<Frame>)> = self
            .outbound
            .read()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut delivery = Delivery::default();
        for (id, sender) in &targets {
            deliver(*id, sender, &frame, &mut delivery);
        }
        delivery
    }
}

fn encode_frame(message: &ServerMessage) -> Option<Frame> {
    match encode(message) {
        Ok(bytes) => Some(Frame::from(bytes)),
        Err(e) => {
            warn!("Failed to encode message for broadcast: {}", e);
            None
        }
    }
}

fn deliver(id: ConnectionId, sender: &mpsc::Sender<Frame>, frame: &Frame, delivery: &mut Delivery) {
    match sender.try_send(frame.clone()) {
        Ok(()) => {
            delivery.delivered += 1;
            delivery.bytes += frame.len();
        }
        Err(TrySendError::Full(_)) => {
            debug!("Connection {} outbound queue full, frame dropped", id);
            delivery.dropped += 1;
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Connection {} closed, frame dropped", id);
            delivery.dropped += 1;
        }
    }
}
