//! TLS acceptor construction from PEM certificate/key files.
//!
//! Grounded in `ad_server.c`'s `init_ssl` (which loads a cert and private
//! key into an OpenSSL context once, at `start`); here the equivalent is a
//! `rustls::ServerConfig` built once and wrapped in a `TlsAcceptor`.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Loads `cert_path`/`key_path` (PEM) and builds a [`TlsAcceptor`] for the
/// server's listener.
pub(crate) fn build_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(Error::new_tls)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(Error::new_io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::new_io)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(Error::new_io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(Error::new_io)?
        .ok_or_else(|| Error::new_config("no private key found in server.ssl_pkey file"))
}
