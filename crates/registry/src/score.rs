// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network locality scoring.

use std::net::Ipv4Addr;

/// Score an endpoint against the local address: the length of the longest
/// matching prefix of dotted octets, 0..4. Same host scores 4, same /24
/// scores 3, and so on down to 0 for no shared prefix.
pub fn locality_score(local: Ipv4Addr, remote: Ipv4Addr) -> u8 {
    local
        .octets()
        .iter()
        .zip(remote.octets().iter())
        .take_while(|(a, b)| a == b)
        .count() as u8
}
