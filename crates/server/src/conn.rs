// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection protocol handling.
//!
//! Each connection walks handshake → header → request → dispatch → reply
//! and back to header; any protocol failure is terminal for the
//! connection, never for the server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bson::{doc, Document};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use skynet_wire::{
    encode_payload, read_message, service_from_method, write_message, ClientHandshake,
    ProtocolError, Request, RequestHeader, Response, ResponseHeader, ServiceHandshake,
};

use crate::server::ServerOptions;
use crate::service::{ServiceError, SkynetService};

pub(crate) type ServiceMap = HashMap<String, Arc<dyn SkynetService>>;

pub(crate) async fn serve(
    stream: TcpStream,
    services: Arc<ServiceMap>,
    options: ServerOptions,
    cancel: CancellationToken,
) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string());
    match handle(stream, &services, &options, &cancel).await {
        Ok(()) => debug!(peer, "connection closed"),
        Err(ProtocolError::ShortRead) => debug!(peer, "peer disconnected"),
        Err(e) => warn!(peer, error = %e, "connection failed"),
    }
}

async fn handle(
    mut stream: TcpStream,
    services: &ServiceMap,
    options: &ServerOptions,
    cancel: &CancellationToken,
) -> Result<(), ProtocolError> {
    let _ = stream.set_nodelay(true);

    let clientid = Uuid::new_v4().to_string();
    write_message(&mut stream, &ServiceHandshake { registered: true, clientid }).await?;

    // The client's half of the handshake carries nothing we need yet.
    let _ack: ClientHandshake = timed_read(&mut stream, options.read_timeout).await?;

    let mut expected_seq: i64 = 0;
    loop {
        // Between requests the connection just waits; only shutdown or the
        // peer closing ends it.
        let header: RequestHeader = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = read_message(&mut stream) => read?,
        };
        let service_name = service_from_method(&header.servicemethod)?.to_string();
        if header.seq != expected_seq {
            return Err(ProtocolError::SequenceMismatch {
                expected: expected_seq,
                got: header.seq,
            });
        }

        // The request body follows its header immediately.
        let request: Request = timed_read(&mut stream, options.read_timeout).await?;
        let params = request.decode_params()?;

        let service = match services.get(&service_name) {
            Some(service) => service,
            None => {
                warn!(service = %service_name, "request for unknown service");
                let header = ResponseHeader {
                    servicemethod: header.servicemethod,
                    seq: header.seq,
                    error: format!("unknown service: {}", service_name),
                };
                write_message(&mut stream, &header).await?;
                let empty = Response {
                    out: encode_payload(&Document::new())?,
                    error: String::new(),
                };
                write_message(&mut stream, &empty).await?;
                expected_seq += 1;
                continue;
            }
        };

        debug!(service = %service_name, method = %request.method, seq = header.seq, "dispatching");
        let reply = match service.dispatch(&request.method, params).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                debug!(service = %service_name, "handler requested connection close");
                return Ok(());
            }
            // A handler failure is a normal reply whose payload carries
            // the exception.
            Err(error) => exception_reply(&error),
        };

        let response_header = ResponseHeader {
            servicemethod: header.servicemethod,
            seq: header.seq,
            error: String::new(),
        };
        write_message(&mut stream, &response_header).await?;
        let response = Response { out: encode_payload(&reply)?, error: String::new() };
        write_message(&mut stream, &response).await?;
        expected_seq += 1;
    }
}

fn exception_reply(error: &ServiceError) -> Document {
    doc! {
        "exception": {
            "class": &error.class,
            "message": &error.message,
            "backtrace": error.backtrace.clone(),
        }
    }
}

async fn timed_read<T>(stream: &mut TcpStream, timeout: Duration) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned,
{
    match tokio::time::timeout(timeout, read_message(stream)).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        ))),
    }
}
