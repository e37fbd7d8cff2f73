//! Discovery channel: the shared UDP medium heartbeats travel on.
//!
//! The group address decides how the socket is set up:
//!
//! - a multicast group is joined on bind and left on [`DiscoveryChannel::leave`],
//! - a broadcast address gets `SO_BROADCAST`,
//! - anything else is bound directly and the socket talks to itself, which
//!   is what single-host tests use.
//!
//! Multicast and broadcast sockets set the reuse flags so several peers on
//! one machine can share the discovery port.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::NetworkError;

/// How heartbeats reach the other peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Multicast,
    Broadcast,
    Unicast,
}

impl ChannelMode {
    /// Pick the mode implied by a group address.
    pub fn for_group(group: IpAddr) -> Self {
        match group {
            IpAddr::V4(v4) if v4.is_multicast() => Self::Multicast,
            IpAddr::V4(v4) if v4.is_broadcast() || v4.octets()[3] == 255 => Self::Broadcast,
            IpAddr::V6(v6) if v6.is_multicast() => Self::Multicast,
            _ => Self::Unicast,
        }
    }
}

/// A bound discovery socket plus the address heartbeats are sent to.
#[derive(Debug)]
pub struct DiscoveryChannel {
    socket: Arc<UdpSocket>,
    mode: ChannelMode,
    group: IpAddr,
    target: SocketAddr,
}

impl DiscoveryChannel {
    /// Bind the discovery socket for `group:port` and join the group if needed.
    pub async fn bind(group: IpAddr, port: u16) -> Result<Self, NetworkError> {
        let mode = ChannelMode::for_group(group);

        let socket = match mode {
            ChannelMode::Unicast => UdpSocket::bind(SocketAddr::new(group, port))
                .await
                .map_err(|e| NetworkError::Discovery(format!("Bind {group}:{port}: {e}")))?,
            ChannelMode::Multicast | ChannelMode::Broadcast => shared_socket(group, port, mode)
                .map_err(|e| NetworkError::Discovery(format!("Bind {group}:{port}: {e}")))?,
        };

        if mode == ChannelMode::Multicast {
            join_group(&socket, group)
                .map_err(|e| NetworkError::Discovery(format!("Join {group}: {e}")))?;
        }

        let target = match mode {
            ChannelMode::Unicast => socket.local_addr()?,
            ChannelMode::Multicast | ChannelMode::Broadcast => SocketAddr::new(group, port),
        };

        info!(
            "Discovery channel ({mode:?}) listening on {}, announcing to {target}",
            socket.local_addr()?
        );

        Ok(Self {
            socket: Arc::new(socket),
            mode,
            group,
            target,
        })
    }

    /// Shared handle to the socket, for the sender and receiver loops.
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Where heartbeats are sent.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Leave the multicast group. A no-op for the other modes.
    pub fn leave(&self) {
        if self.mode != ChannelMode::Multicast {
            return;
        }

        let result = match self.group {
            IpAddr::V4(group) => self.socket.leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(group) => self.socket.leave_multicast_v6(&group, 0),
        };
        match result {
            Ok(()) => debug!("Left discovery group {}", self.group),
            Err(e) => warn!("Failed to leave discovery group {}: {e}", self.group),
        }
    }
}

/// Build a reusable socket bound to the wildcard address on `port`.
fn shared_socket(group: IpAddr, port: u16, mode: ChannelMode) -> std::io::Result<UdpSocket> {
    let wildcard: IpAddr = match group {
        IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let bind_addr = SocketAddr::new(wildcard, port);

    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    if mode == ChannelMode::Broadcast {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&bind_addr.into())?;

    UdpSocket::from_std(socket.into())
}

fn join_group(socket: &UdpSocket, group: IpAddr) -> std::io::Result<()> {
    match group {
        IpAddr::V4(group) => {
            socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
            socket.set_multicast_loop_v4(true)?;
            // Stay inside the local network.
            socket.set_multicast_ttl_v4(1)
        }
        IpAddr::V6(group) => {
            socket.join_multicast_v6(&group, 0)?;
            socket.set_multicast_loop_v6(true)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_for_group() {
        let mode = |s: &str| ChannelMode::for_group(s.parse().unwrap());
        assert_eq!(mode("230.0.0.1"), ChannelMode::Multicast);
        assert_eq!(mode("239.255.255.250"), ChannelMode::Multicast);
        assert_eq!(mode("ff02::1"), ChannelMode::Multicast);
        assert_eq!(mode("255.255.255.255"), ChannelMode::Broadcast);
        assert_eq!(mode("192.168.1.255"), ChannelMode::Broadcast);
        assert_eq!(mode("127.0.0.1"), ChannelMode::Unicast);
        assert_eq!(mode("::1"), ChannelMode::Unicast);
    }

    #[tokio::test]
    async fn test_unicast_channel_targets_itself() {
        let channel = DiscoveryChannel::bind("127.0.0.1".parse().unwrap(), 0)
            .await
            .unwrap();
        assert_eq!(channel.mode(), ChannelMode::Unicast);

        let local = channel.local_addr().unwrap();
        assert_ne!(local.port(), 0);
        assert_eq!(channel.target(), local);

        // A datagram sent to the target comes straight back.
        let socket = channel.socket();
        socket.send_to(b"ping", channel.target()).await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            socket.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&buf[..len], b"ping");

        // Leaving is a no-op outside multicast mode.
        channel.leave();
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_discovery_error() {
        let first = DiscoveryChannel::bind("127.0.0.1".parse().unwrap(), 0)
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let second = DiscoveryChannel::bind("127.0.0.1".parse().unwrap(), port).await;
        assert!(matches!(second, Err(NetworkError::Discovery(_))));
    }
}
