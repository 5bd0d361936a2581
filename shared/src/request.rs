//! Text payloads carried by GET, PUT and ERROR messages.

use std::fmt;

use crate::{constants::PAYLOAD_SEPARATOR, types::FileId};

/// Payload of a GET request: `<file_id>` or `<file_id>|<resume_token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    pub file_id: FileId,
    pub resume_token: Option<String>,
}

impl GetRequest {
    /// Parses the payload leniently, a malformed id becomes 0 and an empty token is absent.
    pub fn parse(payload: &str) -> Self {
        let (id, token) = match payload.split_once(PAYLOAD_SEPARATOR) {
            Some((id, token)) => (id, Some(token)),
            None => (payload, None),
        };

        Self {
            file_id: id.trim().parse().unwrap_or(0),
            resume_token: token.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    pub fn to_payload(&self) -> String {
        match &self.resume_token {
            Some(token) => format!("{}{PAYLOAD_SEPARATOR}{token}", self.file_id),
            None => self.file_id.to_string(),
        }
    }
}

/// Payload of a PUT request: `<name>|<declared_size>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub name: String,
    pub size: u64,
}

impl PutRequest {
    /// Returns `None` when the separator is missing, an unparsable size becomes 0.
    pub fn parse(payload: &str) -> Option<Self> {
        let (name, size) = payload.split_once(PAYLOAD_SEPARATOR)?;

        Some(Self {
            name: name.to_string(),
            size: size.trim().parse().unwrap_or(0),
        })
    }

    pub fn to_payload(&self) -> String {
        format!("{}{PAYLOAD_SEPARATOR}{}", self.name, self.size)
    }
}

/// Payload of a GET response: `<size>`, or `<size>|<offset>` when the server resumes a transfer.
///
/// Exactly `size - offset` raw bytes follow the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetReply {
    pub size: u64,
    pub offset: u64,
}

impl GetReply {
    pub fn parse(payload: &str) -> Option<Self> {
        let (size, offset) = match payload.split_once(PAYLOAD_SEPARATOR) {
            Some((size, offset)) => (size, offset.trim().parse().ok()?),
            None => (payload, 0),
        };
        let size = size.trim().parse().ok()?;

        if offset > size {
            return None;
        }
        Some(Self { size, offset })
    }

    pub fn to_payload(&self) -> String {
        if self.offset == 0 {
            self.size.to_string()
        } else {
            format!("{}{PAYLOAD_SEPARATOR}{}", self.size, self.offset)
        }
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }
}

/// Machine-readable tokens carried by ERROR messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FileNotFound,
    FileMissing,
    BadRequest,
    InsertMetaFailed,
    AllocFailed,
    OpenFailed,
    UnknownMsg,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        ErrorCode::FileNotFound,
        ErrorCode::FileMissing,
        ErrorCode::BadRequest,
        ErrorCode::InsertMetaFailed,
        ErrorCode::AllocFailed,
        ErrorCode::OpenFailed,
        ErrorCode::UnknownMsg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FileNotFound => "file-not-found",
            ErrorCode::FileMissing => "file-missing",
            ErrorCode::BadRequest => "bad-request",
            ErrorCode::InsertMetaFailed => "insert-meta-failed",
            ErrorCode::AllocFailed => "alloc-failed",
            ErrorCode::OpenFailed => "open-failed",
            ErrorCode::UnknownMsg => "unknown-msg",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == token)
    }

    /// Human-readable explanation for the operator.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCode::FileNotFound => "no file with this id exists on the server",
            ErrorCode::FileMissing => "the file is registered but its contents are missing on the server",
            ErrorCode::BadRequest => "the server could not understand the request",
            ErrorCode::InsertMetaFailed => "the server could not register the file (is the name already taken?)",
            ErrorCode::AllocFailed => "the server could not allocate storage for the file",
            ErrorCode::OpenFailed => "the server could not open the file contents",
            ErrorCode::UnknownMsg => "the server does not support this request",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
