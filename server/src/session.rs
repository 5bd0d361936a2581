//! One session per accepted connection: read a message, answer it, repeat until the connection
//! ends or can no longer be trusted.

use std::{fmt::Write as _, time::Duration};

use shared::{
    message::{read_header, read_payload, write_message, Message, MessageType},
    request::{ErrorCode, GetRequest, PutRequest},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tracing::debug;

use crate::{
    config::ServerConfig,
    error::{RequestError, SessionError},
    store::{FileRecord, Stores},
    transfer::{receive_file, send_file},
};

const LISTING_HEADER: &str = "ID   SIZE(bytes)  UPLOADED_AT        DL  NAME";

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub list_limit: u32,
    pub idle_timeout: Option<Duration>,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            list_limit: config.list_limit,
            idle_timeout: config.idle_timeout,
        }
    }
}

pub struct Session<S> {
    stream: S,
    stores: Stores,
    settings: SessionSettings,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(stream: S, stores: Stores, settings: SessionSettings) -> Self {
        Self {
            stream,
            stores,
            settings,
        }
    }

    /// Serves requests until the session ends, and returns why it ended.
    pub async fn run(mut self) -> SessionError {
        loop {
            let message = match self.next_message().await {
                Ok(message) => message,
                Err(e) => return e,
            };
            debug!(msg_type = ?message.msg_type, len = message.payload.len(), "[net] request");

            match self.dispatch(message).await {
                Ok(()) => {}
                Err(RequestError::Reply(code)) => {
                    debug!(%code, "[net] request failed");
                    if let Err(e) = write_message(&mut self.stream, MessageType::Error, code.as_str()).await {
                        return e.into();
                    }
                }
                Err(RequestError::Fatal(e)) => return e,
            }
        }
    }

    /// The idle timeout only bounds the wait for the next header, a started message may take longer.
    async fn next_message(&mut self) -> Result<Message, SessionError> {
        let (msg_type, length) = match self.settings.idle_timeout {
            Some(limit) => match timeout(limit, read_header(&mut self.stream)).await {
                Ok(header) => header?,
                Err(_) => return Err(SessionError::IdleTimeout(limit)),
            },
            None => read_header(&mut self.stream).await?,
        };

        Ok(read_payload(&mut self.stream, msg_type, length).await?)
    }

    async fn dispatch(&mut self, message: Message) -> Result<(), RequestError> {
        match message.msg_type {
            MessageType::Ping => {
                write_message(&mut self.stream, MessageType::Pong, "OK").await?;
            }
            MessageType::ListRequest => {
                let files = self.stores.meta.list_newest_first(self.settings.list_limit).await?;
                write_message(&mut self.stream, MessageType::ListResponse, format_listing(&files)).await?;
            }
            MessageType::GetRequest => {
                let request = GetRequest::parse(&message.payload_str());
                send_file(&mut self.stream, &self.stores, &request).await?;
            }
            MessageType::PutRequest => {
                let request =
                    PutRequest::parse(&message.payload_str()).ok_or(RequestError::Reply(ErrorCode::BadRequest))?;
                receive_file(&mut self.stream, &self.stores, &request).await?;
            }
            _ => return Err(RequestError::Reply(ErrorCode::UnknownMsg)),
        }

        Ok(())
    }
}

/// Renders the LIST table: a header line and one fixed-width row per file, without a trailing newline.
pub fn format_listing(files: &[FileRecord]) -> String {
    let mut table = String::from(LISTING_HEADER);
    for file in files {
        // writing into a String can't fail
        let _ = write!(
            table,
            "\n{:>4} {:>12}  {:>16}  {:>3}  {}",
            file.file_id, file.size, file.uploaded_at, file.download_count, file.name
        );
    }
    table
}
