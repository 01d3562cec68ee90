// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single RPC connection: dial, handshake, sequenced invocation.

use std::time::Duration;

use bson::Document;
use tokio::net::TcpStream;
use tracing::debug;

use skynet_core::Endpoint;
use skynet_wire::{
    encode_payload, forward_method, read_message, write_message, ClientHandshake, ProtocolError,
    Request, RequestHeader, RequestInfo, Response, ResponseHeader, ServiceHandshake,
};

use crate::error::RpcError;

/// Dial and per-read timeouts for one connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    /// Additional dial attempts after the first failure.
    pub retry_count: u32,
    pub retry_interval: Duration,
    /// Applies to every framed read on the connection.
    pub read_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            retry_count: 3,
            retry_interval: Duration::from_millis(500),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// One invocation's inputs.
pub struct CallRequest<'a> {
    pub request_id: &'a str,
    pub service: &'a str,
    pub method: &'a str,
    pub params: &'a Document,
    /// How many times this logical request has been retried already.
    pub retry_count: i32,
    /// Whether the caller declares the call safe to re-send after a
    /// failed read.
    pub idempotent: bool,
}

/// Which half of an invocation failed, for the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Write,
    Read,
}

#[derive(Debug)]
pub(crate) struct CallError {
    pub(crate) phase: Phase,
    pub(crate) error: RpcError,
}

impl CallError {
    fn write(error: impl Into<RpcError>) -> Self {
        Self { phase: Phase::Write, error: error.into() }
    }

    fn read(error: impl Into<RpcError>) -> Self {
        Self { phase: Phase::Read, error: error.into() }
    }
}

/// A handshaken TCP connection with its session state.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    endpoint: Endpoint,
    clientid: String,
    seq: i64,
    read_timeout: Duration,
}

impl Connection {
    /// Dial with retries, then perform the Skynet handshake.
    pub async fn connect(endpoint: &Endpoint, opts: &ConnectOptions) -> Result<Self, RpcError> {
        let mut last_err: Option<std::io::Error> = None;
        for attempt in 0..=opts.retry_count {
            if attempt > 0 {
                tokio::time::sleep(opts.retry_interval).await;
            }
            let dial = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
            match tokio::time::timeout(opts.connect_timeout, dial).await {
                Ok(Ok(stream)) => return Self::handshake(stream, endpoint, opts).await,
                Ok(Err(e)) => {
                    debug!(endpoint = %endpoint, attempt, error = %e, "dial failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    debug!(endpoint = %endpoint, attempt, "dial timed out");
                    last_err = Some(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ));
                }
            }
        }
        Err(RpcError::ConnectionFailure {
            endpoint: endpoint.clone(),
            source: last_err.unwrap_or_else(|| std::io::Error::other("no dial attempts made")),
        })
    }

    async fn handshake(
        mut stream: TcpStream,
        endpoint: &Endpoint,
        opts: &ConnectOptions,
    ) -> Result<Self, RpcError> {
        let _ = stream.set_nodelay(true);

        let hello: ServiceHandshake =
            read_framed(&mut stream, opts.read_timeout).await.map_err(|e| match e {
                RpcError::Protocol(p) => {
                    RpcError::Protocol(ProtocolError::Handshake(p.to_string()))
                }
                other => other,
            })?;
        if !hello.registered {
            return Err(RpcError::NotRegistered(endpoint.clone()));
        }

        write_message(&mut stream, &ClientHandshake { clientid: hello.clientid.clone() }).await?;

        debug!(endpoint = %endpoint, clientid = %hello.clientid, "connection established");
        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            clientid: hello.clientid,
            seq: 0,
            read_timeout: opts.read_timeout,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn clientid(&self) -> &str {
        &self.clientid
    }

    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// One-shot invocation without pool or retry policy. The `idempotent`
    /// flag is advisory here; retry decisions belong to the caller.
    pub async fn rpc_call(
        &mut self,
        request_id: &str,
        service: &str,
        method: &str,
        params: &Document,
        idempotent: bool,
    ) -> Result<Document, RpcError> {
        let request =
            CallRequest { request_id, service, method, params, retry_count: 0, idempotent };
        self.call(&request).await.map_err(|e| e.error)
    }

    /// Invoke one method. The sequence number only advances on success, so
    /// a failed connection is discarded rather than reused out of step.
    pub(crate) async fn call(&mut self, req: &CallRequest<'_>) -> Result<Document, CallError> {
        let header =
            RequestHeader { servicemethod: forward_method(req.service), seq: self.seq };
        let request = Request {
            clientid: self.clientid.clone(),
            params: encode_payload(req.params).map_err(CallError::write)?,
            method: req.method.to_string(),
            requestinfo: RequestInfo {
                requestid: req.request_id.to_string(),
                retrycount: req.retry_count,
                originaddress: String::new(),
            },
        };

        write_message(&mut self.stream, &header).await.map_err(CallError::write)?;
        write_message(&mut self.stream, &request).await.map_err(CallError::write)?;

        let response_header: ResponseHeader =
            read_framed(&mut self.stream, self.read_timeout).await.map_err(CallError::read)?;
        if response_header.seq != self.seq {
            return Err(CallError::read(ProtocolError::SequenceMismatch {
                expected: self.seq,
                got: response_header.seq,
            }));
        }
        if !response_header.error.is_empty() {
            return Err(CallError::read(RpcError::Skynet(response_header.error)));
        }

        let response: Response =
            read_framed(&mut self.stream, self.read_timeout).await.map_err(CallError::read)?;
        if !response.error.is_empty() {
            return Err(CallError::read(RpcError::Service(response.error)));
        }

        self.seq += 1;
        response.decode_out().map_err(CallError::read)
    }
}

async fn read_framed<T>(stream: &mut TcpStream, timeout: Duration) -> Result<T, RpcError>
where
    T: serde::de::DeserializeOwned,
{
    match tokio::time::timeout(timeout, read_message(stream)).await {
        Ok(Ok(message)) => Ok(message),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(RpcError::ReadTimeout(timeout)),
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
