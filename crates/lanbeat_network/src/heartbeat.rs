//! Heartbeat sender and receiver.
//!
//! The sender announces our id and unicast contact on the discovery channel
//! every interval. The receiver turns every valid heartbeat it hears into a
//! directory upsert plus a last-seen update stamped with the local clock,
//! and surfaces group chat lines heard on the same channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::chat::ChatHistory;
use crate::directory::{LastSeen, PeerDirectory, now_ms};
use crate::event::{EventSink, NodeEvent};
use crate::identity::{Contact, PeerId};
use crate::message::{
    HeartbeatMessage, RECV_BUFFER_SIZE, WireCodec, WireMessage, within_datagram_limit,
};
use crate::shutdown::ShutdownListener;

/// Periodically broadcasts our heartbeat.
pub struct HeartbeatSender {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    peer_id: PeerId,
    contact: Contact,
    codec: Arc<dyn WireCodec>,
    interval: Duration,
}

impl HeartbeatSender {
    pub fn new(
        socket: Arc<UdpSocket>,
        target: SocketAddr,
        peer_id: PeerId,
        contact: Contact,
        codec: Arc<dyn WireCodec>,
        interval: Duration,
    ) -> Self {
        Self {
            socket,
            target,
            peer_id,
            contact,
            codec,
            interval,
        }
    }

    /// The heartbeat we would send at `now_ms`.
    pub fn heartbeat(&self, now_ms: u64) -> WireMessage {
        WireMessage::Heartbeat(HeartbeatMessage {
            sender: self.peer_id,
            timestamp_ms: now_ms,
            ip: self.contact.ip.clone(),
            port: self.contact.port,
        })
    }

    /// Send one heartbeat per interval until shutdown. The first goes out immediately.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let payload = match self.codec.encode(&self.heartbeat(now_ms())) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!("Heartbeat not sent: {e}");
                            continue;
                        }
                    };
                    match self.socket.send_to(&payload, self.target).await {
                        Ok(_) => trace!("Heartbeat sent to {}", self.target),
                        Err(e) => warn!("Heartbeat send to {} failed: {e}", self.target),
                    }
                }
                _ = shutdown.wait() => {
                    debug!("Heartbeat sender shutting down");
                    break;
                }
            }
        }
    }
}

/// Listens on the discovery channel and records who is alive where.
pub struct HeartbeatReceiver {
    socket: Arc<UdpSocket>,
    local_id: PeerId,
    directory: PeerDirectory,
    last_seen: LastSeen,
    chat: ChatHistory,
    codec: Arc<dyn WireCodec>,
    events: EventSink,
}

impl HeartbeatReceiver {
    pub fn new(
        socket: Arc<UdpSocket>,
        local_id: PeerId,
        directory: PeerDirectory,
        last_seen: LastSeen,
        chat: ChatHistory,
        codec: Arc<dyn WireCodec>,
        events: EventSink,
    ) -> Self {
        Self {
            socket,
            local_id,
            directory,
            last_seen,
            chat,
            codec,
            events,
        }
    }

    /// Apply one datagram received at `received_at_ms`.
    ///
    /// Returns the sender id when the datagram was a valid heartbeat or chat
    /// line. Only heartbeats touch the directory and last-seen table; our
    /// own chat lines coming back from the group are skipped.
    pub fn handle_datagram(&self, data: &[u8], received_at_ms: u64) -> Option<PeerId> {
        let heartbeat = match self.codec.decode(data) {
            Ok(WireMessage::Heartbeat(hb)) => hb,
            Ok(WireMessage::Chat(chat)) => {
                if chat.from != self.local_id {
                    self.chat.push(chat.from, chat.text.clone());
                    self.events.emit(NodeEvent::Chat {
                        from: chat.from,
                        text: chat.text,
                    });
                }
                return Some(chat.from);
            }
            Ok(other) => {
                debug!("Ignoring {} on discovery channel", other.kind());
                return None;
            }
            Err(e) => {
                debug!("Dropping malformed discovery datagram: {e}");
                return None;
            }
        };

        let contact = heartbeat.contact();
        match self.directory.put(heartbeat.sender, contact.clone()) {
            None => {
                info!("Discovered peer {} at {contact}", heartbeat.sender);
                if heartbeat.sender != self.local_id {
                    self.events.emit(NodeEvent::PeerJoined {
                        peer_id: heartbeat.sender,
                        contact,
                    });
                }
            }
            Some(previous) if previous != contact => {
                info!("Peer {} moved from {previous} to {contact}", heartbeat.sender)
            }
            Some(_) => {}
        }
        self.last_seen.touch(heartbeat.sender, received_at_ms);

        Some(heartbeat.sender)
    }

    /// Receive heartbeats until shutdown or an unrecoverable socket error.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, src)) if !within_datagram_limit(len) => {
                        debug!("Dropping oversized discovery datagram ({len} bytes) from {src}");
                    }
                    Ok((len, src)) => {
                        if let Some(peer_id) = self.handle_datagram(&buf[..len], now_ms()) {
                            trace!("Discovery datagram from peer {peer_id} via {src}");
                        }
                    }
                    Err(e) if is_transient(&e) => {
                        debug!("Transient discovery receive error: {e}");
                    }
                    Err(e) => {
                        if shutdown.is_running() {
                            error!("Discovery receive failed, heartbeat receiver stopping: {e}");
                        }
                        break;
                    }
                },
                _ = shutdown.wait() => {
                    debug!("Heartbeat receiver shutting down");
                    break;
                }
            }
        }
    }
}

/// ICMP-triggered errors some platforms report on unconnected UDP sockets.
pub(crate) fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
