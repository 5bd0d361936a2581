//! Protocol calls against the file server over one persistent connection.

mod download;
mod upload;

pub use download::DownloadOutcome;

use shared::{
    message::{read_message, write_message, FrameError, Message, MessageType},
    request::ErrorCode,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The server answered with an ERROR message, the connection is still usable.
    #[error("server refused the request ({token}): {}", describe(.token))]
    Rejected { token: String },

    #[error("unexpected {0:?} reply from the server")]
    UnexpectedReply(MessageType),

    #[error("malformed reply from the server: {0:?}")]
    MalformedReply(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl RequestError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RequestError::Rejected { token } => ErrorCode::from_token(token),
            _ => None,
        }
    }

    /// Whether the connection can still carry further requests after this error.
    pub fn keeps_connection(&self) -> bool {
        matches!(self, RequestError::Rejected { .. })
    }
}

fn describe(token: &str) -> &'static str {
    ErrorCode::from_token(token).map_or("unknown error", ErrorCode::describe)
}

pub struct Connection<S = TcpStream> {
    stream: S,
    server_addr: String,
}

impl Connection<TcpStream> {
    pub async fn connect(server_addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        debug!(%server_addr, "[net] connected");

        Ok(Self::new(stream, server_addr))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S, server_addr: impl Into<String>) -> Self {
        Self {
            stream,
            server_addr: server_addr.into(),
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub async fn ping(&mut self) -> Result<String, RequestError> {
        let reply = self.request(MessageType::Ping, "", MessageType::Pong).await?;
        Ok(reply.payload_str().into_owned())
    }

    /// Fetches the file table. The server ignores `path`.
    pub async fn list(&mut self, path: &str) -> Result<String, RequestError> {
        let reply = self
            .request(MessageType::ListRequest, path, MessageType::ListResponse)
            .await?;
        Ok(reply.payload_str().into_owned())
    }

    /// Sends one request and waits for its reply, which has to be `expected` or an ERROR.
    async fn request(
        &mut self,
        msg_type: MessageType,
        payload: impl AsRef<[u8]>,
        expected: MessageType,
    ) -> Result<Message, RequestError> {
        write_message(&mut self.stream, msg_type, payload).await?;
        let reply = read_message(&mut self.stream).await?;

        match reply.msg_type {
            t if t == expected => Ok(reply),
            MessageType::Error => Err(RequestError::Rejected {
                token: reply.payload_str().into_owned(),
            }),
            other => Err(RequestError::UnexpectedReply(other)),
        }
    }
}
