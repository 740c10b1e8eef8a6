use std::io;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::connection::ConnectionId;
use crate::registry::Registry;

/// Deliver `message` to every registered connection except `origin`.
///
/// Pass `None` as the origin for notices that must reach everyone still
/// present. Targets are taken from a snapshot and written concurrently with
/// the registry lock released. A target whose write fails is unregistered and
/// closed; the remaining targets are unaffected and the failure is not
/// reported to the caller.
///
/// Returns how many targets accepted the message.
pub async fn broadcast(registry: &Registry, origin: Option<ConnectionId>, message: &[u8]) -> usize {
    let targets: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|conn| Some(conn.id()) != origin)
        .collect();

    let deliveries = targets.iter().map(|target| async move {
        match target.send(message).await {
            Ok(()) => true,
            Err(err) => {
                if err.kind() == io::ErrorKind::NotConnected {
                    debug!(id = %target.id(), "skipping connection that is already closing");
                } else {
                    warn!(
                        id = %target.id(),
                        peer = %target.endpoint(),
                        error = %err,
                        "write failed, dropping connection"
                    );
                }
                registry.remove(target.id());
                target.close().await;
                false
            }
        }
    });

    join_all(deliveries)
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, DuplexStream, duplex};
    use tokio::time::timeout;

    fn connect(registry: &Registry, port: u16) -> (Arc<Connection>, DuplexStream) {
        let (local, remote) = duplex(1024);
        let conn = Connection::new(format!("127.0.0.1:{port}").parse().unwrap(), local);
        registry.add(conn.clone());
        (conn, remote)
    }

    async fn read_line(stream: &mut DuplexStream) -> String {
        let mut line = String::new();
        let mut reader = BufReader::new(stream);
        timeout(Duration::from_secs(1), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for line")
            .unwrap();
        line
    }

    #[tokio::test]
    async fn origin_never_receives_its_own_message() {
        let registry = Registry::new();
        let (a, mut a_remote) = connect(&registry, 1);
        let (_b, mut b_remote) = connect(&registry, 2);

        let delivered = broadcast(&registry, Some(a.id()), b"ping\n").await;
        assert_eq!(delivered, 1);
        assert_eq!(read_line(&mut b_remote).await, "ping\n");

        let mut buf = [0u8; 1];
        let nothing = timeout(Duration::from_millis(100), a_remote.read(&mut buf)).await;
        assert!(nothing.is_err(), "origin received its own broadcast");
    }

    #[tokio::test]
    async fn system_notice_reaches_everyone() {
        let registry = Registry::new();
        let (_a, mut a_remote) = connect(&registry, 1);
        let (_b, mut b_remote) = connect(&registry, 2);

        assert_eq!(broadcast(&registry, None, b"notice\n").await, 2);
        assert_eq!(read_line(&mut a_remote).await, "notice\n");
        assert_eq!(read_line(&mut b_remote).await, "notice\n");
    }

    #[tokio::test]
    async fn failed_target_is_pruned_without_affecting_others() {
        let registry = Registry::new();
        let (c, _c_remote) = connect(&registry, 1);
        let (_a, mut a_remote) = connect(&registry, 2);
        let (d, d_remote) = connect(&registry, 3);
        let (_e, mut e_remote) = connect(&registry, 4);
        drop(d_remote);

        let delivered = broadcast(&registry, Some(c.id()), b"msg\n").await;

        assert_eq!(delivered, 2);
        assert_eq!(read_line(&mut a_remote).await, "msg\n");
        assert_eq!(read_line(&mut e_remote).await, "msg\n");
        assert!(!registry.contains(d.id()));
        assert!(d.is_closed());
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn closed_target_is_removed_once() {
        let registry = Registry::new();
        let (a, _a_remote) = connect(&registry, 1);
        a.close().await;

        assert_eq!(broadcast(&registry, None, b"x\n").await, 0);
        assert!(registry.is_empty());
        assert_eq!(broadcast(&registry, None, b"y\n").await, 0);
    }
}
