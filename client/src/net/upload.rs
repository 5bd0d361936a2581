use std::path::Path;

use anyhow::{anyhow, bail, Context};
use shared::{
    constants::{CHUNK_SIZE, PAYLOAD_SEPARATOR},
    message::{FrameError, MessageType},
    request::PutRequest,
};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
};
use tracing::info;

use super::{Connection, RequestError};

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Uploads a local file under its file name, returns the number of bytes sent. `on_progress`
    /// gets the bytes sent so far and the file size after each chunk.
    pub async fn put(&mut self, path: &Path, mut on_progress: impl FnMut(u64, u64)) -> anyhow::Result<u64> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?;
        if name.contains(PAYLOAD_SEPARATOR) {
            bail!("file names containing '{PAYLOAD_SEPARATOR}' can't be uploaded");
        }

        let mut file = File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let size = file.metadata().await?.len();

        let request = PutRequest {
            name: name.to_string(),
            size,
        };
        self.request(MessageType::PutRequest, request.to_payload(), MessageType::PutResponse)
            .await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent = 0u64;
        while sent < size {
            // bounded by CHUNK_SIZE, so the conversion can't truncate
            let len = (size - sent).min(CHUNK_SIZE as u64) as usize;
            let chunk = &mut buf[..len];

            // the server expects exactly `size` bytes, a file that shrank leaves the connection unusable
            file.read_exact(chunk)
                .await
                .with_context(|| format!("{} changed during the upload", path.display()))?;
            self.stream
                .write_all(chunk)
                .await
                .map_err(|e| RequestError::Frame(FrameError::from_io(e)))?;
            sent += len as u64;
            on_progress(sent, size);
        }
        self.stream
            .flush()
            .await
            .map_err(|e| RequestError::Frame(FrameError::from_io(e)))?;

        info!(%name, size, "[net] upload complete");
        Ok(sent)
    }
}
