use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be created. Never retried.
    #[error("failed to bind chat relay on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("tls: {0}")]
    Tls(#[from] native_tls::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
