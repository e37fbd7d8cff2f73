//! Peer identity: numeric peer ids and unicast contact information.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::message::check_field;

/// A unique identifier for a peer, assigned at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PeerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for PeerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Where a peer can be reached for direct messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// IP address (or host name) as announced by the peer.
    pub ip: String,
    /// Unicast UDP port.
    pub port: u16,
}

impl Contact {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Resolve the contact to a socket address.
    ///
    /// Literal IPs are used as-is; anything else goes through DNS.
    pub async fn resolve(&self) -> Result<SocketAddr, NetworkError> {
        if let Ok(ip) = self.ip.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        tokio::net::lookup_host((self.ip.as_str(), self.port))
            .await
            .map_err(|e| NetworkError::InvalidAddress(format!("{self}: {e}")))?
            .next()
            .ok_or_else(|| NetworkError::InvalidAddress(format!("{self}: no addresses")))
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The identity of the local node on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Our peer id.
    pub peer_id: PeerId,
    /// The IP we advertise in heartbeats so others can reach our unicast port.
    pub advertise_ip: String,
}

impl NodeIdentity {
    pub fn new(peer_id: PeerId, advertise_ip: impl Into<String>) -> Self {
        Self {
            peer_id,
            advertise_ip: advertise_ip.into(),
        }
    }

    /// Check that the advertised IP can be carried in a heartbeat.
    pub fn validate(&self) -> Result<(), NetworkError> {
        check_field("advertise_ip", &self.advertise_ip)
            .map_err(|e| NetworkError::InvalidConfig(e.to_string()))
    }

    /// The contact we announce, given the port our unicast socket is bound to.
    pub fn contact(&self, unicast_port: u16) -> Contact {
        Contact::new(self.advertise_ip.clone(), unicast_port)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
