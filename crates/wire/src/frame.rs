// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed BSON frame reader/writer.

use bson::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A peer announcing more than this is
/// treated as corrupt rather than allocated for.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Smallest legal BSON document: 4-byte length + terminating NUL.
const MIN_FRAME_LEN: i32 = 5;

/// Errors in the framing layer and protocol state machine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame announced an invalid length: {0}")]
    FrameLength(i64),

    #[error("short read: peer closed mid-frame")]
    ShortRead,

    #[error("sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: i64, got: i64 },

    #[error("malformed handshake: {0}")]
    Handshake(String),

    #[error("servicemethod must end in \".Forward\": {0:?}")]
    BadServiceMethod(String),

    #[error("BSON decode: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("BSON encode: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn map_read_err(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ShortRead
    } else {
        ProtocolError::Io(e)
    }
}

/// Read one framed BSON document.
///
/// Reads the 4-byte length, then exactly the remaining bytes. A read that
/// returns fewer bytes than announced is an error, never a partial document.
pub async fn read_document<R>(reader: &mut R) -> Result<Document, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_read_err)?;
    let len = i32::from_le_bytes(len_buf);
    if len < MIN_FRAME_LEN || len as usize > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameLength(len as i64));
    }

    let mut buf = vec![0u8; len as usize];
    buf[..4].copy_from_slice(&len_buf);
    reader.read_exact(&mut buf[4..]).await.map_err(map_read_err)?;

    Ok(Document::from_reader(&mut buf.as_slice())?)
}

/// Write one framed BSON document. The document's own leading length field
/// is the frame prefix; nothing else goes on the wire.
pub async fn write_document<W>(writer: &mut W, doc: &Document) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one framed document and deserialize it into a message type.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let doc = read_document(reader).await?;
    Ok(bson::from_document(doc)?)
}

/// Serialize a message and write it as one framed document.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let doc = bson::to_document(message)?;
    write_document(writer, &doc).await
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
