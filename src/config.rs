//! Relay configuration.
//!
//! Values come from the process environment, after loading a `.env` file
//! from the working directory if one exists.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tokio_native_tls::TlsAcceptor;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::tls;

pub const HOST_VAR: &str = "CHAT_RELAY_HOST";
pub const PORT_VAR: &str = "CHAT_RELAY_PORT";
pub const WORKERS_VAR: &str = "CHAT_RELAY_WORKERS";
pub const TLS_PKCS12_VAR: &str = "CHAT_RELAY_TLS_PKCS12";
pub const TLS_PASSWORD_VAR: &str = "CHAT_RELAY_TLS_PASSWORD";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// tokio worker threads for the server runtime.
    pub workers: usize,
    /// PKCS#12 identity; TLS is enabled when set.
    pub tls_identity: Option<PathBuf>,
    pub tls_password: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: num_cpus::get(),
            tls_identity: None,
            tls_password: String::new(),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source. Missing keys take defaults,
    /// present but unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let workers = match lookup(WORKERS_VAR) {
            Some(raw) => {
                let workers: usize = parse(WORKERS_VAR, &raw)?;
                if workers == 0 {
                    return Err(RelayError::Config {
                        key: WORKERS_VAR,
                        value: raw,
                        reason: "must be at least 1".to_string(),
                    });
                }
                workers
            }
            None => defaults.workers,
        };

        Ok(Self {
            host: lookup(HOST_VAR).unwrap_or(defaults.host),
            port: match lookup(PORT_VAR) {
                Some(raw) => parse(PORT_VAR, &raw)?,
                None => defaults.port,
            },
            workers,
            tls_identity: lookup(TLS_PKCS12_VAR)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            tls_password: lookup(TLS_PASSWORD_VAR).unwrap_or_default(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tls_acceptor(&self) -> Result<Option<TlsAcceptor>> {
        self.tls_identity
            .as_deref()
            .map(|path| tls::load_acceptor(path, &self.tls_password))
            .transpose()
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|err: T::Err| RelayError::Config {
        key,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}
