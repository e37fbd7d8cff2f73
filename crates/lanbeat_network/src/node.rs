//! Node: top-level coordinator for a LanBeat peer.
//!
//! [`Node`] is the primary public API of lanbeat_network. Once started it
//! runs four background tasks, all stopped by one shared shutdown signal:
//! - heartbeat sender (announce ourselves on the discovery channel)
//! - heartbeat receiver (maintain the directory and last-seen table, hear chat)
//! - failure detector (report peers that went silent)
//! - unicast receiver (surface direct messages addressed to us)

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::{ChatEntry, ChatHistory};
use crate::config::NodeConfig;
use crate::directory::{LastSeen, PeerDirectory, now_ms};
use crate::discovery::DiscoveryChannel;
use crate::error::NetworkError;
use crate::event::{EVENT_QUEUE_CAPACITY, EventSink, NodeEvent};
use crate::failure::FailureDetector;
use crate::heartbeat::{HeartbeatReceiver, HeartbeatSender};
use crate::identity::{Contact, NodeIdentity, PeerId};
use crate::message::{ChatMessage, TextCodec, WireCodec, WireMessage};
use crate::shutdown::ShutdownSignal;
use crate::transport::{UnicastMessenger, check_payload_size};

/// Sockets and tasks that only exist while the node runs.
struct Running {
    discovery: DiscoveryChannel,
    messenger: UnicastMessenger,
    contact: Contact,
    tasks: Vec<JoinHandle<()>>,
}

/// One peer on the discovery channel.
///
/// Create it with [`Node::new`], then call [`start()`](Node::start) to bind
/// the sockets and spawn the background loops. Dropping a started node
/// signals its loops to stop; [`shutdown()`](Node::shutdown) also waits
/// for them.
pub struct Node {
    identity: NodeIdentity,
    config: NodeConfig,
    directory: PeerDirectory,
    last_seen: LastSeen,
    chat: ChatHistory,
    codec: Arc<dyn WireCodec>,
    shutdown: ShutdownSignal,
    running: Option<Running>,
}

impl Node {
    /// Create a node. Nothing is bound until [`start()`](Node::start).
    pub fn new(identity: NodeIdentity, config: NodeConfig) -> Self {
        let last_seen = LastSeen::seeded(identity.peer_id, now_ms());
        Self {
            identity,
            config,
            directory: PeerDirectory::new(),
            last_seen,
            chat: ChatHistory::new(),
            codec: Arc::new(TextCodec),
            shutdown: ShutdownSignal::new(),
            running: None,
        }
    }

    /// Replace the wire codec. Only effective before `start()`.
    pub fn with_codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Whether the node has been started and not shut down.
    pub fn is_running(&self) -> bool {
        self.running.is_some() && self.shutdown.is_running()
    }

    /// Shared handle to the peer directory.
    pub fn directory(&self) -> PeerDirectory {
        self.directory.clone()
    }

    /// Shared handle to the last-seen table.
    pub fn last_seen(&self) -> LastSeen {
        self.last_seen.clone()
    }

    /// Chat lines sent or heard by this node, oldest first.
    pub fn chat_history(&self) -> Vec<ChatEntry> {
        self.chat.snapshot()
    }

    /// Directory snapshot ordered by peer id.
    pub fn dump(&self) -> Vec<(PeerId, Contact)> {
        let mut entries = self.directory.dump();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Address of the bound unicast socket.
    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.running
            .as_ref()
            .ok_or(NetworkError::NotRunning)?
            .messenger
            .local_addr()
    }

    /// Address of the bound discovery socket.
    pub fn discovery_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.running
            .as_ref()
            .ok_or(NetworkError::NotRunning)?
            .discovery
            .local_addr()
    }

    /// The contact we announce in heartbeats.
    pub fn contact(&self) -> Option<&Contact> {
        self.running.as_ref().map(|r| &r.contact)
    }

    /// Bind both sockets and spawn the background loops.
    ///
    /// Returns the receiving end of the node's event queue. Bind failures
    /// and an unusable identity or config are returned as errors and leave
    /// the node stopped.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<NodeEvent>, NetworkError> {
        if self.running.is_some() {
            return Err(NetworkError::AlreadyStarted);
        }
        if !self.shutdown.is_running() {
            return Err(NetworkError::NotRunning);
        }
        self.identity.validate()?;
        self.config.validate()?;

        let discovery =
            DiscoveryChannel::bind(self.config.group, self.config.discovery_port).await?;

        let unicast_bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.unicast_port));
        let unicast = UdpSocket::bind(unicast_bind).await?;
        let unicast_port = unicast.local_addr()?.port();
        let unicast = Arc::new(unicast);
        info!("Unicast socket listening on port {unicast_port}");

        let contact = self.identity.contact(unicast_port);
        let (events, events_rx) = EventSink::channel(EVENT_QUEUE_CAPACITY);

        let sender = HeartbeatSender::new(
            discovery.socket(),
            discovery.target(),
            self.identity.peer_id,
            contact.clone(),
            Arc::clone(&self.codec),
            self.config.heartbeat_interval,
        );
        let receiver = HeartbeatReceiver::new(
            discovery.socket(),
            self.identity.peer_id,
            self.directory.clone(),
            self.last_seen.clone(),
            self.chat.clone(),
            Arc::clone(&self.codec),
            events.clone(),
        );
        let detector = FailureDetector::new(
            self.identity.peer_id,
            self.last_seen.clone(),
            self.config.failure_timeout,
            self.config.failure_check_interval,
            events.clone(),
        );
        let messenger = UnicastMessenger::new(
            self.identity.peer_id,
            unicast,
            self.directory.clone(),
            Arc::clone(&self.codec),
        );

        let tasks = vec![
            tokio::spawn(sender.run(self.shutdown.subscribe())),
            tokio::spawn(receiver.run(self.shutdown.subscribe())),
            tokio::spawn(detector.run(self.shutdown.subscribe())),
            tokio::spawn(
                messenger
                    .clone()
                    .run_receiver(events, self.shutdown.subscribe()),
            ),
        ];

        info!(
            "Node {} started, announcing {contact}",
            self.identity.peer_id
        );
        self.running = Some(Running {
            discovery,
            messenger,
            contact,
            tasks,
        });
        Ok(events_rx)
    }

    /// Send `text` to peer `to` over unicast.
    pub async fn send_message(&self, to: PeerId, text: &str) -> Result<SocketAddr, NetworkError> {
        let running = match &self.running {
            Some(running) if self.shutdown.is_running() => running,
            _ => return Err(NetworkError::NotRunning),
        };
        running.messenger.send(to, text).await
    }

    /// Send `text` to every peer on the discovery channel.
    ///
    /// The line is added to our own chat history. Returns the address it
    /// went to.
    pub async fn broadcast(&self, text: &str) -> Result<SocketAddr, NetworkError> {
        let running = match &self.running {
            Some(running) if self.shutdown.is_running() => running,
            _ => return Err(NetworkError::NotRunning),
        };

        let payload = self.codec.encode(&WireMessage::Chat(ChatMessage {
            from: self.identity.peer_id,
            text: text.to_string(),
        }))?;
        check_payload_size(&payload)?;

        let target = running.discovery.target();
        running.discovery.socket().send_to(&payload, target).await?;
        self.chat.push(self.identity.peer_id, text);
        debug!("Chat line of {} bytes sent to {target}", payload.len());
        Ok(target)
    }

    /// Stop every background loop and leave the discovery group.
    ///
    /// Returns `true` for the call that actually shut the node down and
    /// `false` for any later call.
    pub async fn shutdown(&mut self) -> bool {
        if !self.shutdown.trigger() {
            return false;
        }

        if let Some(running) = self.running.take() {
            running.discovery.leave();
            for task in running.tasks {
                if let Err(e) = task.await {
                    warn!("Node task ended abnormally: {e}");
                }
            }
        }

        debug!("Node {} stopped", self.identity.peer_id);
        true
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.shutdown.trigger() {
            if let Some(running) = self.running.take() {
                running.discovery.leave();
                debug!("Node {} dropped while running", self.identity.peer_id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
