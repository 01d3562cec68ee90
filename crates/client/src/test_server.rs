// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted wire-speaking servers for exercising the client side alone.

use tokio::net::{TcpListener, TcpStream};

use skynet_core::Endpoint;
use skynet_wire::{
    encode_payload, read_message, write_message, ClientHandshake, Request, RequestHeader,
    Response, ResponseHeader, ServiceHandshake,
};

/// Per-connection behavior. Connection `n` uses `modes[n]`, with the last
/// entry repeating for any further connections.
#[derive(Debug, Clone)]
pub(crate) enum Mode {
    /// Handshake, then echo every request's params back as the reply.
    Echo,
    /// Handshake with `registered: false`, then close.
    NotRegistered,
    /// Echo, but reply with a shifted sequence number.
    WrongSeq,
    /// Reply with this error in the response header.
    HeaderError(String),
    /// Reply with this error in the response body.
    ResponseError(String),
    /// Handshake and read requests, but never reply.
    Silent,
    /// Read one header+request, then drop the connection.
    DropAfterRequest,
}

/// Bind a scripted server on an OS-assigned port.
pub(crate) async fn spawn(modes: Vec<Mode>) -> Endpoint {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut accepted = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mode = modes.get(accepted).or_else(|| modes.last()).cloned();
            accepted += 1;
            if let Some(mode) = mode {
                tokio::spawn(serve_connection(stream, mode, accepted));
            }
        }
    });
    Endpoint::new("127.0.0.1", port)
}

/// An endpoint nothing is listening on (bound once, then released).
pub(crate) async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

async fn serve_connection(mut stream: TcpStream, mode: Mode, nth: usize) {
    let registered = !matches!(mode, Mode::NotRegistered);
    let hello =
        ServiceHandshake { registered, clientid: format!("clientid-{nth}") };
    if write_message(&mut stream, &hello).await.is_err() || !registered {
        return;
    }
    let Ok(_ack) = read_message::<_, ClientHandshake>(&mut stream).await else {
        return;
    };

    loop {
        let Ok(header) = read_message::<_, RequestHeader>(&mut stream).await else {
            return;
        };
        let Ok(request) = read_message::<_, Request>(&mut stream).await else {
            return;
        };
        let params = request.decode_params().unwrap_or_default();

        let (seq, header_error, body_error) = match &mode {
            Mode::WrongSeq => (header.seq + 100, String::new(), String::new()),
            Mode::HeaderError(e) => (header.seq, e.clone(), String::new()),
            Mode::ResponseError(e) => (header.seq, String::new(), e.clone()),
            Mode::Silent => return tokio::time::sleep(std::time::Duration::from_secs(3600)).await,
            Mode::DropAfterRequest => return,
            Mode::Echo | Mode::NotRegistered => (header.seq, String::new(), String::new()),
        };

        let response_header = ResponseHeader {
            servicemethod: header.servicemethod.clone(),
            seq,
            error: header_error,
        };
        let Ok(out) = encode_payload(&params) else {
            return;
        };
        let response = Response { out, error: body_error };
        if write_message(&mut stream, &response_header).await.is_err() {
            return;
        }
        if write_message(&mut stream, &response).await.is_err() {
            return;
        }
    }
}
