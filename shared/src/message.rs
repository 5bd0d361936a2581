//! Message framing.
//!
//! Every message is a fixed 16 byte header followed by `length` payload bytes:
//!
//! ```text
//! offset 0  : magic     [4 bytes LE: 0x4654504C]
//! offset 4  : version   [2 bytes LE: 1]
//! offset 6  : type      [2 bytes LE: MessageType]
//! offset 8  : length    [4 bytes LE: payload byte count]
//! offset 12 : reserved  [4 bytes LE: 0]
//! offset 16 : payload   [length bytes]
//! ```
//!
//! Bulk file data of GET and PUT is not framed, it follows the response or request as raw bytes.

use std::{borrow::Cow, io};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{HEADER_LEN, MAGIC, PROTOCOL_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Magic or version did not match, the stream can no longer be trusted.
    #[error("malformed header (magic {magic:#010x}, version {version})")]
    MalformedHeader { magic: u32, version: u16 },

    #[error("connection closed by peer")]
    Closed,

    #[error("payload of {0} bytes doesn't fit in a message")]
    PayloadTooLarge(usize),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Converts an I/O error, treating a premature EOF as a closed connection.
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => FrameError::Closed,
            _ => FrameError::Io(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ping,
    Pong,
    ListRequest,
    ListResponse,
    GetRequest,
    GetResponse,
    PutRequest,
    PutResponse,
    Error,
    /// A type code this implementation does not know about.
    Unknown(u16),
}

impl MessageType {
    pub fn code(self) -> u16 {
        match self {
            MessageType::Ping => 1,
            MessageType::Pong => 2,
            MessageType::ListRequest => 10,
            MessageType::ListResponse => 11,
            MessageType::GetRequest => 20,
            MessageType::GetResponse => 21,
            MessageType::PutRequest => 30,
            MessageType::PutResponse => 31,
            MessageType::Error => 1000,
            MessageType::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1 => MessageType::Ping,
            2 => MessageType::Pong,
            10 => MessageType::ListRequest,
            11 => MessageType::ListResponse,
            20 => MessageType::GetRequest,
            21 => MessageType::GetResponse,
            30 => MessageType::PutRequest,
            31 => MessageType::PutResponse,
            1000 => MessageType::Error,
            other => MessageType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// Payload interpreted as text, invalid UTF-8 sequences are replaced.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Encodes a header and payload into a single buffer.
pub fn encode(msg_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf.extend_from_slice(&msg_type.code().to_le_bytes());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Validates a raw header and returns the message type and payload length.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(MessageType, u32), FrameError> {
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let version = u16::from_le_bytes([header[4], header[5]]);

    if magic != MAGIC || version != PROTOCOL_VERSION {
        return Err(FrameError::MalformedHeader { magic, version });
    }

    let msg_type = MessageType::from_code(u16::from_le_bytes([header[6], header[7]]));
    let length = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    // reserved (bytes 12..16) is ignored

    Ok((msg_type, length))
}

/// Reads exactly one message, waiting for the full header and payload.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, FrameError> {
    let (msg_type, length) = read_header(reader).await?;
    read_payload(reader, msg_type, length).await
}

/// Reads and validates the next header, returning the message type and payload length.
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(MessageType, u32), FrameError> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(FrameError::from_io)?;

    decode_header(&header)
}

/// Reads the `length` payload bytes that follow a header from [`read_header`].
pub async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    msg_type: MessageType,
    length: u32,
) -> Result<Message, FrameError> {
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await.map_err(FrameError::from_io)?;

    Ok(Message { msg_type, payload })
}

/// Writes one message and flushes the writer.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg_type: MessageType,
    payload: impl AsRef<[u8]>,
) -> Result<(), FrameError> {
    writer
        .write_all(&encode(msg_type, payload.as_ref())?)
        .await
        .map_err(FrameError::from_io)?;
    writer.flush().await.map_err(FrameError::from_io)?;

    Ok(())
}
