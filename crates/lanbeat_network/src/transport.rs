//! Unicast transport: point-to-point text messages addressed by peer id.
//!
//! Each peer owns one UDP socket for direct messages. Sending resolves the
//! destination through the peer directory; receiving surfaces messages
//! addressed to us as [`NodeEvent::Message`] and drops everything else.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

use crate::directory::PeerDirectory;
use crate::error::NetworkError;
use crate::event::{EventSink, NodeEvent};
use crate::heartbeat::is_transient;
use crate::identity::PeerId;
use crate::message::{
    DirectMessage, MAX_DATAGRAM_SIZE, RECV_BUFFER_SIZE, WireCodec, WireMessage,
    within_datagram_limit,
};
use crate::shutdown::ShutdownListener;

/// Sends and receives direct messages over the peer's unicast socket.
#[derive(Clone)]
pub struct UnicastMessenger {
    local_id: PeerId,
    socket: Arc<UdpSocket>,
    directory: PeerDirectory,
    codec: Arc<dyn WireCodec>,
}

impl UnicastMessenger {
    pub fn new(
        local_id: PeerId,
        socket: Arc<UdpSocket>,
        directory: PeerDirectory,
        codec: Arc<dyn WireCodec>,
    ) -> Self {
        Self {
            local_id,
            socket,
            directory,
            codec,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send `text` to peer `to`. Returns the address it went to.
    ///
    /// Fails with [`NetworkError::PeerNotFound`] before touching the socket
    /// if `to` has never announced itself.
    pub async fn send(&self, to: PeerId, text: &str) -> Result<SocketAddr, NetworkError> {
        let contact = self
            .directory
            .get(to)
            .ok_or(NetworkError::PeerNotFound(to))?;

        let payload = self.codec.encode(&WireMessage::Direct(DirectMessage {
            from: self.local_id,
            to,
            text: text.to_string(),
        }))?;
        check_payload_size(&payload)?;

        let addr = contact.resolve().await?;
        self.socket.send_to(&payload, addr).await?;
        debug!("Sent {} bytes to peer {to} at {addr}", payload.len());
        Ok(addr)
    }

    /// Decode a datagram and keep it only if it is a direct message for us.
    pub fn accept(&self, data: &[u8]) -> Option<DirectMessage> {
        match self.codec.decode(data) {
            Ok(WireMessage::Direct(msg)) if msg.to == self.local_id => Some(msg),
            Ok(WireMessage::Direct(msg)) => {
                debug!("Discarding message for peer {} (we are {})", msg.to, self.local_id);
                None
            }
            Ok(other) => {
                debug!("Ignoring {} on unicast port", other.kind());
                None
            }
            Err(e) => {
                debug!("Dropping malformed unicast datagram: {e}");
                None
            }
        }
    }

    /// Receive direct messages until shutdown, forwarding ours to `events`.
    pub async fn run_receiver(self, events: EventSink, mut shutdown: ShutdownListener) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, src)) if !within_datagram_limit(len) => {
                        debug!("Dropping oversized unicast datagram ({len} bytes) from {src}");
                    }
                    Ok((len, src)) => {
                        if let Some(msg) = self.accept(&buf[..len]) {
                            trace!("Message from peer {} via {src}", msg.from);
                            events.emit(NodeEvent::Message {
                                from: msg.from,
                                text: msg.text,
                            });
                        }
                    }
                    Err(e) if is_transient(&e) => {
                        debug!("Transient unicast receive error: {e}");
                    }
                    Err(e) => {
                        if shutdown.is_running() {
                            error!("Unicast receive failed, message receiver stopping: {e}");
                        }
                        break;
                    }
                },
                _ = shutdown.wait() => {
                    debug!("Unicast receiver shutting down");
                    break;
                }
            }
        }
    }
}

/// Refuse a payload the receiving side would not accept.
pub(crate) fn check_payload_size(payload: &[u8]) -> Result<(), NetworkError> {
    if payload.len() > MAX_DATAGRAM_SIZE {
        return Err(NetworkError::MessageTooLarge {
            size: payload.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::identity::Contact;
    use crate::message::TextCodec;
    use crate::shutdown::ShutdownSignal;

    async fn messenger(id: u32, directory: PeerDirectory) -> UnicastMessenger {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        UnicastMessenger::new(PeerId(id), Arc::new(socket), directory, Arc::new(TextCodec))
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let sender = messenger(1, PeerDirectory::new()).await;
        let err = sender.send(PeerId(42), "hello").await.unwrap_err();
        assert!(matches!(err, NetworkError::PeerNotFound(PeerId(42))));
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_message() {
        let directory = PeerDirectory::new();
        directory.put(PeerId(2), Contact::new("127.0.0.1", 9));
        let sender = messenger(1, directory).await;

        let text = "x".repeat(MAX_DATAGRAM_SIZE);
        let err = sender.send(PeerId(2), &text).await.unwrap_err();
        assert!(matches!(err, NetworkError::MessageTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_accept_filters_by_destination() {
        let receiver = messenger(2, PeerDirectory::new()).await;

        assert_eq!(
            receiver.accept(b"MSG;1;2;hi;there"),
            Some(DirectMessage {
                from: PeerId(1),
                to: PeerId(2),
                text: "hi;there".to_string(),
            })
        );
        assert_eq!(receiver.accept(b"MSG;1;3;not for us"), None);
        assert_eq!(receiver.accept(b"HEARTBEAT;1;0;127.0.0.1;6001"), None);
        assert_eq!(receiver.accept(b"MSG;x;2;bad"), None);
    }

    #[tokio::test]
    async fn test_message_delivered_end_to_end() {
        let directory = PeerDirectory::new();
        let receiver = messenger(2, directory.clone()).await;
        let receiver_addr = receiver.local_addr().unwrap();
        directory.put(PeerId(2), Contact::new("127.0.0.1", receiver_addr.port()));
        let sender = messenger(1, directory).await;

        let (events, mut rx) = EventSink::channel(8);
        let signal = ShutdownSignal::new();
        let task = tokio::spawn(receiver.run_receiver(events, signal.subscribe()));

        let addr = sender.send(PeerId(2), "hello world").await.unwrap();
        assert_eq!(addr, receiver_addr);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("message should arrive")
            .unwrap();
        assert_eq!(
            event,
            NodeEvent::Message {
                from: PeerId(1),
                text: "hello world".to_string(),
            }
        );

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("receiver should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_not_delivered() {
        let receiver = messenger(2, PeerDirectory::new()).await;
        let receiver_addr = receiver.local_addr().unwrap();
        let (events, mut rx) = EventSink::channel(8);
        let signal = ShutdownSignal::new();
        let task = tokio::spawn(receiver.run_receiver(events, signal.subscribe()));

        // Well-formed for us, but longer than any peer is allowed to send.
        let mut oversized = b"MSG;1;2;".to_vec();
        oversized.resize(3000, b'a');
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&oversized, receiver_addr).await.unwrap();
        peer.send_to(b"MSG;1;2;short one", receiver_addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("the short message should arrive")
            .unwrap();
        assert_eq!(
            event,
            NodeEvent::Message {
                from: PeerId(1),
                text: "short one".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());

        signal.trigger();
        task.await.unwrap();
    }

    #[test]
    fn test_check_payload_size() {
        assert!(check_payload_size(&[0u8; MAX_DATAGRAM_SIZE]).is_ok());
        assert!(matches!(
            check_payload_size(&[0u8; MAX_DATAGRAM_SIZE + 1]),
            Err(NetworkError::MessageTooLarge { size, max: MAX_DATAGRAM_SIZE })
                if size == MAX_DATAGRAM_SIZE + 1
        ));
    }
}
