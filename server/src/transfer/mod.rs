//! Chunked GET and PUT transfers.
//!
//! Bulk data travels as raw bytes after the GET or PUT response, in chunks of
//! [`CHUNK_SIZE`](shared::constants::CHUNK_SIZE). A GET started with a resume token leaves a
//! checkpoint behind after every chunk, so a later GET with the same token continues from the
//! last delivered byte instead of starting over.

mod receive;
mod send;

pub use receive::receive_file;
pub use send::send_file;

#[cfg(test)]
mod test_util {
    use std::{
        io,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    };

    use tokio::io::AsyncWrite;

    use crate::store::{
        memory::{MemoryBlobs, MemoryMetadata},
        Stores,
    };

    pub fn memory_stores() -> (Arc<MemoryMetadata>, Arc<MemoryBlobs>, Stores) {
        let meta = Arc::new(MemoryMetadata::default());
        let blobs = Arc::new(MemoryBlobs::default());
        let stores = Stores {
            meta: meta.clone(),
            blobs: blobs.clone(),
        };
        (meta, blobs, stores)
    }

    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    /// Accepts `limit` bytes, then fails every write like a dropped connection.
    pub struct CappedWriter {
        pub written: Vec<u8>,
        pub limit: usize,
    }

    impl CappedWriter {
        pub fn new(limit: usize) -> Self {
            Self {
                written: Vec::new(),
                limit,
            }
        }
    }

    impl AsyncWrite for CappedWriter {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let room = self.limit - self.written.len();
            if room == 0 {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }

            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
