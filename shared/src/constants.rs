//! Shared constants for client and server.

/// Fixed tag at the start of every message header ('FTPL').
pub const MAGIC: u32 = 0x4654_504C;

/// The only protocol version understood by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Size of the fixed message header in bytes.
pub const HEADER_LEN: usize = 16;

/// Bulk data chunk size used for both GET and PUT transfers.
pub const CHUNK_SIZE: usize = 64 * 1024; // 64 KiB

/// Separator used inside the text payloads of GET and PUT requests.
pub const PAYLOAD_SEPARATOR: char = '|';

/// Default port of the server.
pub const DEFAULT_PORT: u16 = 8021;
