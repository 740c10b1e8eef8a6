use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tokio::time::{Duration, timeout};

use crate::message;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Upper bound on a graceful shutdown of the write side (a TLS close_notify
/// can block on a peer that is not reading).
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// One accepted peer session, as seen by everyone except its own handler.
///
/// Only the write side lives here. The handler owns the read side, and the
/// registry hands out `Arc<Connection>` so other handlers can deliver
/// broadcasts. Writes go through an async mutex, so two broadcasters never
/// interleave bytes of different lines on the same peer.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<Option<BoxedWriter>>,
    /// Set once by `close`; observed by in-flight sends without the lock.
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new<W>(peer: SocketAddr, writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            id: ConnectionId::next(),
            peer,
            writer: Mutex::new(Some(Box::new(writer))),
            closed: watch::channel(false).0,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn endpoint(&self) -> String {
        message::endpoint(&self.peer)
    }

    /// Write one complete message and flush it.
    ///
    /// Fails with `NotConnected` once the connection has been closed. A write
    /// stuck on a peer that stopped reading is abandoned as soon as
    /// [`Connection::close`] is called.
    pub async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut closed = self.closed.subscribe();
        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or_else(not_connected)?;
            writer.write_all(bytes).await?;
            writer.flush().await
        };

        let cancelled = async {
            while !*closed.borrow_and_update() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            result = write => result,
            _ = cancelled => Err(not_connected()),
        }
    }

    /// Shut down and drop the write side. Returns `false` if it was already
    /// closed, so callers racing on the same peer close it exactly once.
    ///
    /// Pending sends are cancelled first, so this never waits behind a write
    /// to a peer whose receive buffer is full.
    pub async fn close(&self) -> bool {
        self.closed.send_replace(true);
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => {
                // Peer may already be gone; nothing useful to do with the error.
                let _ = timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await;
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn send_reaches_peer() {
        let (local, mut remote) = duplex(64);
        let conn = Connection::new("127.0.0.1:9000".parse().unwrap(), local);

        conn.send(b"hi\n").await.unwrap();

        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi\n");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_sends() {
        let (local, mut remote) = duplex(64);
        let conn = Connection::new("127.0.0.1:9001".parse().unwrap(), local);

        assert!(conn.close().await);
        assert!(!conn.close().await);
        assert!(conn.is_closed());

        let err = conn.send(b"late\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let mut rest = Vec::new();
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn send_fails_when_peer_is_gone() {
        let (local, remote) = duplex(64);
        let conn = Connection::new("127.0.0.1:9002".parse().unwrap(), local);
        drop(remote);

        assert!(conn.send(b"anyone?\n").await.is_err());
    }

    #[tokio::test]
    async fn close_cancels_a_send_stuck_on_a_full_peer() {
        let (local, _remote) = duplex(16);
        let conn = Connection::new("127.0.0.1:9003".parse().unwrap(), local);

        let sender = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(&[b'x'; 1024]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished(), "write should be waiting on the peer");

        let closed = timeout(Duration::from_secs(1), conn.close()).await;
        assert_eq!(closed.ok(), Some(true));

        let result = timeout(Duration::from_secs(1), sender).await.unwrap().unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn ids_are_unique() {
        let (a, _ra) = duplex(8);
        let (b, _rb) = duplex(8);
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_ne!(Connection::new(peer, a).id(), Connection::new(peer, b).id());
    }
}
