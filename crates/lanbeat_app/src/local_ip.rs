//! Best-effort discovery of the IP other peers should use to reach us.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::{debug, warn};

/// Address used only to pick the outbound interface. Connecting a UDP
/// socket sends nothing.
const ROUTE_TARGET: &str = "8.8.8.8:80";

/// The local IP of the interface that routes towards the wider network,
/// or loopback when no such interface exists.
pub fn local_ip() -> IpAddr {
    match outbound_ip() {
        Ok(ip) if !ip.is_unspecified() => {
            debug!("Resolved local IP {ip}");
            ip
        }
        Ok(_) => loopback("no routable interface"),
        Err(e) => loopback(&e.to_string()),
    }
}

fn outbound_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(ROUTE_TARGET)?;
    Ok(socket.local_addr()?.ip())
}

fn loopback(reason: &str) -> IpAddr {
    warn!("Cannot determine local IP ({reason}), advertising 127.0.0.1");
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
