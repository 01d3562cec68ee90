// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The documents each side of a Skynet connection exchanges.
//!
//! Handshake once per connection, then header/request and header/response
//! pairs. Parameters and replies travel as nested BSON inside a binary
//! field, so the outer documents stay fixed-shape.

use bson::spec::BinarySubtype;
use bson::{Binary, Document};
use serde::{Deserialize, Serialize};

use crate::frame::ProtocolError;

/// Every Skynet RPC servicemethod ends in this (legacy indirection layer).
pub const FORWARD_SUFFIX: &str = ".Forward";

/// `"<service>.Forward"` for the request header.
pub fn forward_method(service: &str) -> String {
    format!("{}{}", service, FORWARD_SUFFIX)
}

/// Extract the service name from a `servicemethod`, rejecting anything that
/// does not end in the forward suffix.
pub fn service_from_method(servicemethod: &str) -> Result<&str, ProtocolError> {
    servicemethod
        .strip_suffix(FORWARD_SUFFIX)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProtocolError::BadServiceMethod(servicemethod.to_string()))
}

/// First document on a connection, server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHandshake {
    pub registered: bool,
    pub clientid: String,
}

/// Client's answer to the service handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHandshake {
    pub clientid: String,
}

/// Client to server, before every request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub servicemethod: String,
    pub seq: i64,
}

/// Request metadata threaded through for tracing and retry accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub requestid: String,
    pub retrycount: i32,
    pub originaddress: String,
}

/// Request body following a [`RequestHeader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub clientid: String,
    /// BSON-encoded parameter document.
    #[serde(rename = "in")]
    pub params: Binary,
    pub method: String,
    pub requestinfo: RequestInfo,
}

impl Request {
    pub fn decode_params(&self) -> Result<Document, ProtocolError> {
        Ok(Document::from_reader(&mut self.params.bytes.as_slice())?)
    }
}

/// Server to client, before every response body. An empty `error` means
/// success; anything else is a fabric-level failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub servicemethod: String,
    pub seq: i64,
    #[serde(default)]
    pub error: String,
}

/// Response body following a [`ResponseHeader`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// BSON-encoded reply document.
    pub out: Binary,
    #[serde(default)]
    pub error: String,
}

impl Response {
    pub fn decode_out(&self) -> Result<Document, ProtocolError> {
        Ok(Document::from_reader(&mut self.out.bytes.as_slice())?)
    }
}

/// Wrap a parameter or reply document as the binary payload field.
pub fn encode_payload(doc: &Document) -> Result<Binary, ProtocolError> {
    let mut bytes = Vec::new();
    doc.to_writer(&mut bytes)?;
    Ok(Binary { subtype: BinarySubtype::Generic, bytes })
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
