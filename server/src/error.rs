use std::time::Duration;

use shared::{message::FrameError, request::ErrorCode, types::FileId};

use crate::store::{BlobError, StoreError};

/// Reasons a session ends. Any of these closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("no message received within {0:?}")]
    IdleTimeout(Duration),

    #[error("metadata store failure: {0}")]
    Store(#[from] StoreError),

    #[error("blob store failure: {0}")]
    Blob(#[from] BlobError),

    #[error("blob {file_id} ended at {actual} bytes, {expected} were announced")]
    BlobTruncated { file_id: FileId, expected: u64, actual: u64 },
}

impl SessionError {
    /// The peer went away between or during messages.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, SessionError::Frame(FrameError::Closed))
    }
}

/// Outcome of a failed request: either answered with an ERROR message, or fatal to the session.
#[derive(Debug)]
pub enum RequestError {
    Reply(ErrorCode),
    Fatal(SessionError),
}

impl From<SessionError> for RequestError {
    fn from(e: SessionError) -> Self {
        RequestError::Fatal(e)
    }
}

impl From<FrameError> for RequestError {
    fn from(e: FrameError) -> Self {
        RequestError::Fatal(e.into())
    }
}

impl From<StoreError> for RequestError {
    fn from(e: StoreError) -> Self {
        RequestError::Fatal(e.into())
    }
}

impl From<BlobError> for RequestError {
    fn from(e: BlobError) -> Self {
        RequestError::Fatal(e.into())
    }
}
