//! Mutual TLS for the webhook listener.
//!
//! Clients must present a certificate issued by the configured CA.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsFiles;
use crate::error::{BouncerError, BouncerResult};

fn open(path: &Path, what: &str) -> BouncerResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| BouncerError::tls(format!("read {what} {}: {e}", path.display())))
}

fn load_certs(path: &Path, what: &str) -> BouncerResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path, what)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BouncerError::tls(format!("parse {what} {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(BouncerError::tls(format!(
            "no certificates in {what} {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> BouncerResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path, "key-file")?)
        .map_err(|e| BouncerError::tls(format!("parse key-file {}: {e}", path.display())))?
        .ok_or_else(|| BouncerError::tls(format!("no private key in key-file {}", path.display())))
}

/// Builds a server configuration that requires client certificates signed
/// by the CA in `files.ca_file`.
///
/// # Errors
///
/// Returns `BouncerError::Tls` if any file is unreadable or holds no usable
/// PEM material, or if the certificate and key do not match.
pub fn server_config(files: &TlsFiles) -> BouncerResult<Arc<ServerConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(&files.ca_file, "ca-file")? {
        roots
            .add(cert)
            .map_err(|e| BouncerError::tls(format!("add ca-file certificate: {e}")))?;
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| BouncerError::tls(format!("build client verifier: {e}")))?;

    let certs = load_certs(&files.cert_file, "cert-file")?;
    let key = load_key(&files.key_file)?;

    let mut config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| BouncerError::tls(format!("load cert-file and key-file: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// TLS acceptor for `files`.
///
/// # Errors
///
/// See [`server_config`].
pub fn acceptor(files: &TlsFiles) -> BouncerResult<TlsAcceptor> {
    server_config(files).map(TlsAcceptor::from)
}
