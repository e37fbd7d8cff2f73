//! LanBeat Network: heartbeat-based peer discovery and messaging on a LAN.
//!
//! Every peer periodically announces its id and unicast contact on a shared
//! discovery channel (multicast group, broadcast address, or a plain unicast
//! address for single-host testing). Peers learn each other from those
//! heartbeats, report peers that go silent, exchange direct text messages
//! addressed by peer id, and chat with the whole group.
//!
//! # Architecture
//!
//! - **Protocol**: `;`-delimited UTF-8 datagrams behind the [`WireCodec`] trait.
//! - **Discovery**: one UDP socket per node, set up by [`DiscoveryChannel`].
//! - **Membership**: [`PeerDirectory`] and [`LastSeen`], fed only by heartbeats.
//! - **Failure detection**: stateless timeout scans over [`LastSeen`].
//! - **Messaging**: [`UnicastMessenger`] on a per-peer unicast port.
//! - **Group chat**: `CHAT` lines on the discovery channel, kept in [`ChatHistory`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use lanbeat_network::{Node, NodeConfig, NodeEvent, NodeIdentity, PeerId};
//!
//! # async fn example() -> Result<(), lanbeat_network::NetworkError> {
//! let identity = NodeIdentity::new(PeerId(1), "192.168.1.10");
//! let mut node = Node::new(identity, NodeConfig::default());
//!
//! let mut events = node.start().await?;
//! node.send_message(PeerId(2), "hello").await?;
//! if let Some(NodeEvent::Message { from, text }) = events.recv().await {
//!     println!("{from}: {text}");
//! }
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod event;
pub mod failure;
pub mod heartbeat;
pub mod identity;
pub mod message;
pub mod node;
pub mod shutdown;
pub mod transport;

// Re-exports for convenience

pub use chat::{ChatEntry, ChatHistory};
pub use config::NodeConfig;
pub use directory::{LastSeen, PeerDirectory};
pub use discovery::{ChannelMode, DiscoveryChannel};
pub use error::{DecodeError, EncodeError, NetworkError};
pub use event::NodeEvent;
pub use identity::{Contact, NodeIdentity, PeerId};
pub use message::{
    ChatMessage, DirectMessage, HeartbeatMessage, TextCodec, WireCodec, WireMessage,
};
pub use node::Node;
pub use transport::UnicastMessenger;
