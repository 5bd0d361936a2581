use shared::{
    constants::CHUNK_SIZE,
    message::{write_message, FrameError, MessageType},
    request::{ErrorCode, GetReply, GetRequest},
    types::FileId,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::{
    error::{RequestError, SessionError},
    store::{BlobError, MetadataStore, StoreError, Stores},
};

const CHECKPOINT_CHUNK_SIZE: u32 = CHUNK_SIZE as u32;

/// Serves a GET: announces the size, then streams the blob from the resume point to the end.
pub async fn send_file<W: AsyncWrite + Unpin>(
    writer: &mut W,
    stores: &Stores,
    request: &GetRequest,
) -> Result<(), RequestError> {
    let file_id = request.file_id;
    let token = request.resume_token.as_deref();

    if stores.meta.get_file(file_id).await?.is_none() {
        return Err(RequestError::Reply(ErrorCode::FileNotFound));
    }

    let size = match stores.blobs.size_of(file_id).await {
        Ok(size) => size,
        Err(BlobError::NotFound) => return Err(RequestError::Reply(ErrorCode::FileMissing)),
        Err(e) => {
            debug!(file_id, error = %e, "[get] cannot stat blob");
            return Err(RequestError::Reply(ErrorCode::OpenFailed));
        }
    };

    let offset = resume_offset(stores.meta.as_ref(), token, file_id, size).await?;

    // read ahead before answering, a failure here can still be reported to the client
    let mut chunk = if offset < size {
        match stores.blobs.read_at(file_id, offset, next_chunk_len(size, offset)).await {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(file_id, error = %e, "[get] cannot read blob");
                return Err(RequestError::Reply(ErrorCode::OpenFailed));
            }
        }
    } else {
        Vec::new()
    };

    write_message(writer, MessageType::GetResponse, GetReply { size, offset }.to_payload()).await?;

    let mut sent = offset;
    while sent < size {
        if chunk.is_empty() {
            return Err(SessionError::BlobTruncated {
                file_id,
                expected: size,
                actual: sent,
            }
            .into());
        }

        writer.write_all(&chunk).await.map_err(FrameError::from_io)?;
        writer.flush().await.map_err(FrameError::from_io)?;
        sent += chunk.len() as u64;

        if let Some(token) = token {
            stores
                .meta
                .upsert_resume_checkpoint(token, file_id, sent, CHECKPOINT_CHUNK_SIZE)
                .await?;
        }

        if sent < size {
            chunk = stores.blobs.read_at(file_id, sent, next_chunk_len(size, sent)).await?;
        }
    }

    if let Some(token) = token {
        stores.meta.delete_resume_checkpoint(token).await?;
    }
    stores.meta.increment_download_count(file_id).await?;

    info!(file_id, size, resumed_from = offset, "[get] transfer complete");
    Ok(())
}

/// Where to start sending: the checkpoint of `token` if it belongs to this file and is
/// still inside it, otherwise the beginning.
async fn resume_offset(
    meta: &dyn MetadataStore,
    token: Option<&str>,
    file_id: FileId,
    size: u64,
) -> Result<u64, StoreError> {
    let checkpoint = match token {
        Some(token) => meta.get_resume_checkpoint(token).await?,
        None => None,
    };

    match checkpoint {
        Some(checkpoint) if checkpoint.file_id == file_id && checkpoint.offset < size => Ok(checkpoint.offset),
        Some(checkpoint) => {
            debug!(file_id, offset = checkpoint.offset, "[get] ignoring stale checkpoint");
            Ok(0)
        }
        None => Ok(0),
    }
}

fn next_chunk_len(size: u64, position: u64) -> usize {
    // bounded by CHUNK_SIZE, so the conversion can't truncate
    (size - position).min(CHUNK_SIZE as u64) as usize
}
