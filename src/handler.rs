//! Per-peer session: welcome, join notice, read/relay loop, leave notice.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::connection::Connection;
use crate::message;
use crate::registry::Registry;

/// Longest chunk relayed as one message. A longer line is relayed as
/// several consecutive messages of at most this many bytes each.
pub const MAX_LINE_BYTES: usize = 4096;

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Zero-byte read: the peer closed its side.
    PeerClosed,
    /// The peer sent an empty or whitespace-only line.
    Quit,
    /// The welcome text could not be written.
    WelcomeFailed(io::Error),
    ReadFailed(io::Error),
}

impl SessionEnd {
    pub fn is_graceful(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed | SessionEnd::Quit)
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed => f.write_str("peer closed"),
            SessionEnd::Quit => f.write_str("quit"),
            SessionEnd::WelcomeFailed(err) => write!(f, "welcome failed: {err}"),
            SessionEnd::ReadFailed(err) => write!(f, "read failed: {err}"),
        }
    }
}

/// Drive one connection from welcome to teardown.
///
/// `conn` must already be registered. `reader` is the read side of the same
/// transport and is owned exclusively by this handler.
///
/// On exit the connection is unregistered before the leave notice is sent,
/// so the departing peer is never one of its targets.
pub async fn handle_connection<R>(
    conn: Arc<Connection>,
    reader: R,
    registry: Arc<Registry>,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let end = run_session(&conn, reader, &registry).await;

    if end.is_graceful() {
        info!(id = %conn.id(), peer = %conn.endpoint(), reason = %end, "connection closed");
    } else {
        warn!(id = %conn.id(), peer = %conn.endpoint(), reason = %end, "connection closed");
    }

    registry.remove(conn.id());
    conn.close().await;

    let notice = message::left(&conn.peer());
    broadcast(&registry, None, notice.as_bytes()).await;

    end
}

async fn run_session<R>(conn: &Connection, reader: R, registry: &Registry) -> SessionEnd
where
    R: AsyncRead + Unpin,
{
    let peer = conn.peer();

    if let Err(err) = conn.send(message::welcome(&peer).as_bytes()).await {
        return SessionEnd::WelcomeFailed(err);
    }
    broadcast(registry, Some(conn.id()), message::joined(&peer).as_bytes()).await;

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    // Set while the current line is longer than one chunk.
    let mut continuation = false;
    loop {
        buf.clear();
        let limit = MAX_LINE_BYTES as u64;
        match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(0) => return SessionEnd::PeerClosed,
            Ok(n) => {
                let complete = buf.ends_with(b"\n");
                let line = message::decode_lossy(&buf);
                if !message::is_quit(&line) {
                    let relayed = message::chat_line(&peer, &line);
                    let delivered = broadcast(registry, Some(conn.id()), relayed.as_bytes()).await;
                    debug!(id = %conn.id(), bytes = n, delivered, partial = !complete, "relayed line");
                } else if !continuation {
                    return SessionEnd::Quit;
                }

                if !complete && n < MAX_LINE_BYTES {
                    // Unterminated tail means the peer hit EOF mid-line.
                    return SessionEnd::PeerClosed;
                }
                continuation = !complete;
            }
            Err(err) => return SessionEnd::ReadFailed(err),
        }
    }
}
