//! Multi-client line-oriented chat relay over TCP.
//!
//! Every accepted peer gets its own tokio task. Each line a peer sends is
//! relayed, prefixed with the peer's endpoint, to every other connected peer.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod tls;

pub use broadcast::broadcast;
pub use client::run_client;
pub use config::RelayConfig;
pub use connection::{Connection, ConnectionId};
pub use error::{RelayError, Result};
pub use handler::{SessionEnd, handle_connection};
pub use registry::Registry;
pub use server::{ChatRelay, run_chat_server};
