//! Certificate loading for the HTTPS listener.

use super::config::TlsConfig;
use super::error::{ProxyError, ProxyResult};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Build a TLS acceptor from PEM files.
pub fn load_acceptor(config: &TlsConfig) -> ProxyResult<TlsAcceptor> {
    let certificates = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certificates, key)
        .map_err(|e| ProxyError::Tls(format!("invalid certificate chain: {e}")))?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!(cert = %config.cert_path.display(), "Loaded TLS certificate");

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> ProxyResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| ProxyError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certificates = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Tls(format!("{}: {e}", path.display())))?;

    if certificates.is_empty() {
        return Err(ProxyError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }

    Ok(certificates)
}

fn load_private_key(path: &Path) -> ProxyResult<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| ProxyError::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .map_err(|e| ProxyError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| ProxyError::Tls(format!("{}: no private key found", path.display())))
}
