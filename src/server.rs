use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_native_tls::TlsAcceptor;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::{RelayError, Result};
use crate::handler::handle_connection;
use crate::registry::Registry;

/// The listener side of the relay: accepts peers and spawns a handler task
/// for each one.
pub struct ChatRelay {
    registry: Arc<Registry>,
    tls: Option<TlsAcceptor>,
}

impl Default for ChatRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRelay {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            tls: None,
        }
    }

    /// Serve TLS instead of plain TCP. The line protocol is unchanged.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Bind the listening socket. Failure here is fatal for the caller.
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })
    }

    /// Accept connections until the process goes away.
    pub async fn run(self, listener: TcpListener) {
        self.run_until(listener, future::pending::<()>()).await;
    }

    /// Accept connections until `shutdown` resolves, then stop listening and
    /// close every registered connection. Lines in flight at that moment may
    /// be lost.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, tls = self.tls.is_some(), "chat relay accepting connections");
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => self.on_accept(accepted),
            }
        }

        drop(listener);
        let open = self.registry.drain();
        info!(open = open.len(), "chat relay shutting down");
        join_all(open.iter().map(|conn| conn.close())).await;
    }

    /// Handle one accept outcome. A failed accept only affects that attempt.
    fn on_accept(&self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, addr)) => self.accept(stream, addr),
            Err(err) => warn!(error = %err, "failed to accept connection"),
        }
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        match &self.tls {
            None => {
                let (reader, writer) = stream.into_split();
                start_session(addr, reader, writer, registry);
            }
            Some(acceptor) => {
                // The handshake needs a round trip, so it happens on the
                // connection's own task and registration waits for it.
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls) => {
                            let (reader, writer) = tokio::io::split(tls);
                            start_session(addr, reader, writer, registry);
                        }
                        Err(err) => warn!(peer = %addr, error = %err, "tls handshake failed"),
                    }
                });
            }
        }
    }
}

/// Register the connection, then hand it to its own handler task.
fn start_session<R, W>(addr: SocketAddr, reader: R, writer: W, registry: Arc<Registry>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let conn = Connection::new(addr, writer);
    registry.add(conn.clone());
    info!(id = %conn.id(), peer = %conn.endpoint(), "connection accepted");
    tokio::spawn(handle_connection(conn, reader, registry));
}

/// Serve plain TCP on `listener` forever.
pub async fn run_chat_server(listener: TcpListener) {
    ChatRelay::new().run(listener).await;
}
