use std::path::Path;

use native_tls::{Identity, TlsAcceptor};
use tokio_native_tls::TlsAcceptor as TokioTlsAcceptor;

use crate::error::Result;

pub fn acceptor_from_pkcs12(pkcs12_data: &[u8], password: &str) -> Result<TokioTlsAcceptor> {
    let identity = Identity::from_pkcs12(pkcs12_data, password)?;
    let acceptor = TlsAcceptor::new(identity)?;
    Ok(TokioTlsAcceptor::from(acceptor))
}

/// Read a PKCS#12 bundle from disk and build an acceptor from it.
pub fn load_acceptor(path: &Path, password: &str) -> Result<TokioTlsAcceptor> {
    let data = std::fs::read(path)?;
    acceptor_from_pkcs12(&data, password)
}
