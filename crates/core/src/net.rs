// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local address detection.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Detect the IPv4 address other hosts would see this process on.
///
/// Uses an outbound-UDP probe: connecting a UDP socket to a public address
/// selects the outbound interface without sending any packets. Falls back
/// to loopback when the host has no route (offline machines, containers
/// without external networking).
pub fn local_ipv4() -> Ipv4Addr {
    match probe() {
        Some(ip) => ip,
        None => {
            debug!("outbound-UDP probe failed, falling back to 127.0.0.1");
            Ipv4Addr::LOCALHOST
        }
    }
}

fn probe() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("8.8.8.8", 53)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(_) => None,
    }
}
