use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::Semaphore,
};
use tracing::{debug, info, warn};

use crate::{
    session::{Session, SessionSettings},
    store::Stores,
};

/// Pause after a failed `accept`, so a persistent error (e.g. out of file descriptors) doesn't spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts connections and runs a [`Session`] for each one on its own task.
pub struct Acceptor {
    listener: TcpListener,
    stores: Stores,
    settings: SessionSettings,
    permits: Arc<Semaphore>,
}

impl Acceptor {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        stores: Stores,
        settings: SessionSettings,
        max_sessions: usize,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, stores, settings, max_sessions))
    }

    pub fn from_listener(
        listener: TcpListener,
        stores: Stores,
        settings: SessionSettings,
        max_sessions: usize,
    ) -> Self {
        Self {
            listener,
            stores,
            settings,
            permits: Arc::new(Semaphore::new(max_sessions)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until the task is dropped. Once `max_sessions` are running, new connections wait in
    /// the listen backlog until a session ends.
    pub async fn run(self) {
        loop {
            // the semaphore is never closed
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };

            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "[net] failed to accept connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "[net] cannot disable Nagle's algorithm");
            }
            info!(%peer, "[net] connection accepted");

            let session = Session::new(stream, self.stores.clone(), self.settings);
            tokio::spawn(async move {
                let reason = session.run().await;
                if reason.is_disconnect() {
                    debug!(%peer, "[net] session closed by peer");
                } else {
                    warn!(%peer, reason = %reason, "[net] session terminated");
                }
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::message::{read_message, write_message, Message, MessageType};
    use tokio::net::TcpStream;

    use super::*;
    use crate::store::memory::{MemoryBlobs, MemoryMetadata};

    const SETTINGS: SessionSettings = SessionSettings {
        list_limit: 10,
        idle_timeout: None,
    };

    async fn spawn_acceptor(max_sessions: usize) -> SocketAddr {
        let stores = Stores::new(MemoryMetadata::default(), MemoryBlobs::default());
        let acceptor = Acceptor::bind("127.0.0.1:0", stores, SETTINGS, max_sessions)
            .await
            .unwrap();
        let addr = acceptor.local_addr().unwrap();
        tokio::spawn(acceptor.run());
        addr
    }

    async fn ping(stream: &mut TcpStream) -> Message {
        write_message(stream, MessageType::Ping, "").await.unwrap();
        read_message(stream).await.unwrap()
    }

    #[tokio::test]
    async fn serves_concurrent_sessions() {
        let addr = spawn_acceptor(4).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        assert_eq!(ping(&mut b).await, Message::new(MessageType::Pong, "OK"));
        assert_eq!(ping(&mut a).await, Message::new(MessageType::Pong, "OK"));
    }

    #[tokio::test]
    async fn waits_for_a_free_session_slot() {
        let addr = spawn_acceptor(1).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert_eq!(ping(&mut first).await.msg_type, MessageType::Pong);

        // connects through the backlog, but isn't served while the only slot is taken
        let mut second = TcpStream::connect(addr).await.unwrap();
        write_message(&mut second, MessageType::Ping, "").await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), read_message(&mut second)).await;
        assert!(pending.is_err());

        drop(first);
        let reply = tokio::time::timeout(Duration::from_secs(5), read_message(&mut second))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.msg_type, MessageType::Pong);
    }
}
