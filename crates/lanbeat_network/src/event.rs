//! Events surfaced by a running node to its console (or any other consumer).

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::identity::{Contact, PeerId};

/// Capacity of the node's event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Something the operator should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A tracked peer has not been heard from for longer than the failure timeout.
    PeerDead { peer_id: PeerId, silent_for_ms: u64 },
    /// A remote peer was heard for the first time.
    PeerJoined { peer_id: PeerId, contact: Contact },
    /// A direct message addressed to us arrived.
    Message { from: PeerId, text: String },
    /// Another peer sent a line to the whole group.
    Chat { from: PeerId, text: String },
}

/// Sending half of the event queue, shared by the node's loops.
///
/// Emitting never blocks a loop: if the consumer falls behind, events are
/// dropped with a warning.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<NodeEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the consumer reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NodeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: NodeEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping {event:?}");
            }
            Err(TrySendError::Closed(event)) => {
                trace!("No event consumer, dropping {event:?}");
            }
        }
    }
}
