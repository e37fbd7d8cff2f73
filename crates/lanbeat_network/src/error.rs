//! Network error types.

use crate::identity::PeerId;

/// Errors that can occur in the lanbeat_network crate.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The destination peer has never announced itself in a heartbeat.
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    /// Discovery channel setup (bind, join, socket options) failed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A contact address could not be resolved to a socket address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An encoded message does not fit into a single datagram.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The node configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The node is not running (never started, or already shut down).
    #[error("Node not running")]
    NotRunning,

    /// `start()` was called on a node that has already been started.
    #[error("Node already started")]
    AlreadyStarted,

    /// A message could not be put on the wire.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a datagram fails to decode into a wire message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    #[error("{kind} needs {expected} fields, found {found}")]
    MissingFields {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("field {field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Reasons a wire message cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A field would change the framing of the datagram.
    #[error("field {field} must not contain ';' or whitespace: {value:?}")]
    UnsafeField { field: &'static str, value: String },
}
