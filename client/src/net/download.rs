use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::Context;
use getrandom::getrandom;
use shared::{
    constants::CHUNK_SIZE,
    message::{FrameError, MessageType},
    request::{ErrorCode, GetReply, GetRequest},
    types::{FileId, ResumeToken},
};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use super::{Connection, RequestError};
use crate::{
    config::{resume::resume_target, Config},
    defaults::{PARTIAL_DOWNLOAD_EXTENSION, RESUME_TOKEN_BYTES},
};

#[derive(Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Complete {
        path: PathBuf,
        size: u64,
        resumed_from: u64,
    },
    /// The server resumed past the data kept locally. The stream was discarded along with the
    /// local state, so the next attempt starts over.
    Restart { server_offset: u64, local_len: u64 },
}

fn new_resume_token() -> anyhow::Result<ResumeToken> {
    let mut bytes = [0u8; RESUME_TOKEN_BYTES];
    getrandom(&mut bytes)?;
    Ok(hex::encode(bytes))
}

pub fn partial_path(download_dir: &Path, file_id: FileId) -> PathBuf {
    download_dir.join(format!("{file_id}.{PARTIAL_DOWNLOAD_EXTENSION}"))
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Downloads `file_id` into `download_dir`, continuing an earlier interrupted download of the
    /// same file from the same server when the resume cache has an entry for it.
    ///
    /// The resume cache is updated after every received chunk, so the download can be picked up
    /// again after the connection or the whole client dies. `on_progress` gets the number of bytes
    /// stored so far and the file size after each chunk.
    pub async fn get(
        &mut self,
        config: &Config,
        file_id: FileId,
        download_dir: &Path,
        mut on_progress: impl FnMut(u64, u64),
    ) -> anyhow::Result<DownloadOutcome> {
        let target = resume_target(&self.server_addr, file_id);

        let token = match config.get_resume(&target).await? {
            Some(entry) => {
                info!(%target, offset = entry.offset, "[net] resuming download");
                entry.resume_token
            }
            None => {
                let token = new_resume_token()?;
                // persisted before the request, so the server's checkpoint can always be found again
                config.save_resume(&target, &token, 0).await?;
                token
            }
        };

        let request = GetRequest {
            file_id,
            resume_token: Some(token.clone()),
        };
        let reply = match self
            .request(MessageType::GetRequest, request.to_payload(), MessageType::GetResponse)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                if e.code() == Some(ErrorCode::FileNotFound) {
                    config.delete_resume(&target).await?;
                }
                return Err(e.into());
            }
        };

        let payload = reply.payload_str();
        let GetReply { size, offset } =
            GetReply::parse(&payload).ok_or_else(|| RequestError::MalformedReply(payload.to_string()))?;

        let part_path = partial_path(download_dir, file_id);
        let local_len = match fs::metadata(&part_path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e).with_context(|| format!("cannot access {}", part_path.display())),
        };

        if offset > local_len {
            warn!(%target, offset, local_len, "[net] server resumed beyond the local data, discarding");
            self.discard(size - offset).await?;
            remove_if_exists(&part_path).await?;
            config.delete_resume(&target).await?;
            return Ok(DownloadOutcome::Restart {
                server_offset: offset,
                local_len,
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&part_path)
            .await
            .with_context(|| format!("cannot open {}", part_path.display()))?;
        // anything past the resume point is rewritten
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received = offset;
        while received < size {
            // bounded by CHUNK_SIZE, so the conversion can't truncate
            let len = (size - received).min(CHUNK_SIZE as u64) as usize;
            let chunk = &mut buf[..len];

            self.stream
                .read_exact(chunk)
                .await
                .map_err(|e| RequestError::Frame(FrameError::from_io(e)))?;
            file.write_all(chunk).await?;
            file.flush().await?;
            received += len as u64;

            config.save_resume(&target, &token, received).await?;
            debug!(%target, received, size, "[net] chunk received");
            on_progress(received, size);
        }

        file.sync_all().await?;
        drop(file);

        let path = download_dir.join(file_id.to_string());
        fs::rename(&part_path, &path)
            .await
            .with_context(|| format!("cannot move the download to {}", path.display()))?;
        config.delete_resume(&target).await?;

        info!(%target, size, resumed_from = offset, "[net] download complete");
        Ok(DownloadOutcome::Complete {
            path,
            size,
            resumed_from: offset,
        })
    }

    /// Reads and drops `len` raw bytes, keeping the connection in sync with the server.
    async fn discard(&mut self, len: u64) -> Result<(), RequestError> {
        let copied = tokio::io::copy(&mut (&mut self.stream).take(len), &mut tokio::io::sink())
            .await
            .map_err(FrameError::from_io)?;

        if copied < len {
            return Err(FrameError::Closed.into());
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
