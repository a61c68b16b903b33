//! Local address discovery.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::debug;

/// Address reported to the server when discovery fails.
pub const LOOPBACK: &str = "127.0.0.1";

/// Returns the address of the outbound interface.
///
/// Connecting a UDP socket sends no packets; it only makes the OS pick a
/// route, whose local address is then read back. Falls back to `127.0.0.1`.
pub fn local_ip() -> String {
    match outbound_addr() {
        Some(ip) => ip.to_string(),
        None => {
            debug!("could not determine local address, using loopback");
            LOOPBACK.to_string()
        }
    }
}

fn outbound_addr() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
