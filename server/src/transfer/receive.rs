use shared::{
    constants::CHUNK_SIZE,
    message::{write_message, FrameError, MessageType},
    request::{ErrorCode, PutRequest},
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};

use crate::{error::RequestError, store::Stores};

/// Serves a PUT: registers the file, accepts it, then stores exactly the declared number of bytes.
///
/// A record whose upload is cut short keeps its declared size, nothing here repairs it.
pub async fn receive_file<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    stores: &Stores,
    request: &PutRequest,
) -> Result<(), RequestError> {
    let file_id = match stores.meta.insert_file(&request.name, request.size, None).await {
        Ok(file_id) => file_id,
        Err(e) => {
            debug!(name = %request.name, error = %e, "[put] cannot register file");
            return Err(RequestError::Reply(ErrorCode::InsertMetaFailed));
        }
    };

    if let Err(e) = stores.blobs.allocate(file_id).await {
        debug!(file_id, error = %e, "[put] cannot allocate blob");
        return Err(RequestError::Reply(ErrorCode::AllocFailed));
    }

    write_message(stream, MessageType::PutResponse, "OK").await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;
    while received < request.size {
        // bounded by CHUNK_SIZE, so the conversion can't truncate
        let len = (request.size - received).min(CHUNK_SIZE as u64) as usize;
        let chunk = &mut buf[..len];

        stream.read_exact(chunk).await.map_err(FrameError::from_io)?;
        stores.blobs.write_at(file_id, received, chunk).await?;
        received += len as u64;
    }

    stores.meta.update_file_size(file_id, received).await?;

    info!(file_id, name = %request.name, size = received, "[put] transfer complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use shared::message::{read_message, Message};
    use tokio::io::{duplex, AsyncWriteExt};

    use super::*;
    use crate::{
        error::SessionError,
        store::MetadataStore,
        transfer::test_util::{memory_stores, pattern},
    };

    fn put(name: &str, size: u64) -> PutRequest {
        PutRequest {
            name: name.to_string(),
            size,
        }
    }

    #[tokio::test]
    async fn stores_declared_bytes() {
        let (meta, blobs, stores) = memory_stores();
        let data = pattern(5000);
        let (mut client, mut server) = duplex(1 << 20);

        client.write_all(&data).await.unwrap();
        receive_file(&mut server, &stores, &put("report.txt", 5000)).await.unwrap();

        let reply = read_message(&mut client).await.unwrap();
        assert_eq!(reply, Message::new(MessageType::PutResponse, "OK"));

        let record = meta.get_file(1).await.unwrap().unwrap();
        assert_eq!(record.name, "report.txt");
        assert_eq!(record.size, 5000);
        assert!(record.checksum.is_none());
        assert_eq!(blobs.contents(1).unwrap(), data);
    }

    #[tokio::test]
    async fn multi_chunk_upload() {
        let (_meta, blobs, stores) = memory_stores();
        let data = pattern(2 * CHUNK_SIZE + 10);
        let (mut client, mut server) = duplex(4 * CHUNK_SIZE);

        client.write_all(&data).await.unwrap();
        receive_file(&mut server, &stores, &put("big", data.len() as u64))
            .await
            .unwrap();

        assert_eq!(blobs.contents(1).unwrap(), data);
    }

    #[tokio::test]
    async fn zero_size_upload() {
        let (meta, blobs, stores) = memory_stores();
        let (mut client, mut server) = duplex(1024);

        receive_file(&mut server, &stores, &put("empty", 0)).await.unwrap();

        let reply = read_message(&mut client).await.unwrap();
        assert_eq!(reply.payload_str(), "OK");
        assert_eq!(meta.get_file(1).await.unwrap().unwrap().size, 0);
        assert_eq!(blobs.contents(1).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let (meta, _blobs, stores) = memory_stores();
        meta.insert_file("taken", 1, None).await.unwrap();
        let (mut client, mut server) = duplex(1024);

        let result = receive_file(&mut server, &stores, &put("taken", 3)).await;
        assert!(matches!(result, Err(RequestError::Reply(ErrorCode::InsertMetaFailed))));

        // nothing was answered on the stream
        drop(server);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn short_upload_keeps_declared_size() {
        let (meta, blobs, stores) = memory_stores();
        let (mut client, mut server) = duplex(1024);

        client.write_all(b"only ten b").await.unwrap();
        client.shutdown().await.unwrap();

        let result = receive_file(&mut server, &stores, &put("partial", 100)).await;
        assert!(matches!(
            result,
            Err(RequestError::Fatal(SessionError::Frame(FrameError::Closed)))
        ));

        assert_eq!(meta.get_file(1).await.unwrap().unwrap().size, 100);
        assert!(blobs.contents(1).unwrap().is_empty());
    }
}
