//! TLS acceptor construction from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;
use crate::error::GateError;

pub(crate) fn tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, GateError> {
    let mut cert_reader = BufReader::new(File::open(&tls.cert)?);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(GateError::Config(format!(
            "no certificates found in {}",
            tls.cert.display()
        )));
    }

    let mut key_reader = BufReader::new(File::open(&tls.key)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?.ok_or_else(|| {
        GateError::Config(format!("no private key found in {}", tls.key.display()))
    })?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| GateError::Config(format!("tls setup: {err}")))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
