// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skynet wire protocol: framed BSON documents over TCP.
//!
//! Framing: each document's 4-byte little-endian length prefix (which BSON
//! defines as including itself) is the frame header; the receiver reads the
//! prefix, then exactly the remaining bytes, then parses.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod messages;

pub use frame::{read_document, read_message, write_document, write_message, MAX_FRAME_LEN};
pub use frame::ProtocolError;
pub use messages::{
    encode_payload, forward_method, service_from_method, ClientHandshake, Request, RequestHeader,
    RequestInfo, Response, ResponseHeader, ServiceHandshake, FORWARD_SUFFIX,
};
