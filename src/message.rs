//! Wire text for everything the relay writes to clients.
//!
//! The protocol is plain UTF-8 lines. Every function here returns a complete,
//! newline-terminated unit ready to be written to a socket.

use std::borrow::Cow;
use std::net::SocketAddr;

/// `<ip>:<port>` without the brackets `SocketAddr` puts around IPv6 hosts.
pub fn endpoint(addr: &SocketAddr) -> String {
    format!("{}:{}", addr.ip(), addr.port())
}

pub fn welcome(addr: &SocketAddr) -> String {
    format!(
        "[server] Connected to chat. Your peer: {}\n\
         [server] Type messages and press Enter. Empty line to quit.\n",
        endpoint(addr)
    )
}

pub fn joined(addr: &SocketAddr) -> String {
    format!("[server] User {} joined\n", endpoint(addr))
}

pub fn left(addr: &SocketAddr) -> String {
    format!("[server] User {} left\n", endpoint(addr))
}

/// Prefix a line read from `sender` with its endpoint. `line` keeps its own
/// terminator; one is appended only when the peer closed mid-line.
pub fn chat_line(sender: &SocketAddr, line: &str) -> String {
    let mut out = format!("[{}] {}", endpoint(sender), line);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Decode raw bytes from a peer, replacing invalid sequences with U+FFFD.
pub fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// An empty or whitespace-only line asks the server to end the session.
pub fn is_quit(line: &str) -> bool {
    line.trim().is_empty()
}
