//! TLS material loading and peer identity extraction
//!
//! Builds rustls client/server configurations from PEM files. Both sides
//! advertise `h2` via ALPN. The server requests but does not require a client
//! certificate; admission control on the presented chain happens at the
//! tunnel layer.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::TlsPaths;
use crate::error::ConfigError;

/// Load a PEM certificate chain.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path)
        .map_err(|e| ConfigError::Tls(format!("open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| ConfigError::Tls(format!("parse {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(ConfigError::Tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load a PEM private key.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path)
        .map_err(|e| ConfigError::Tls(format!("open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConfigError::Tls(format!("parse {}: {}", path.display(), e)))?
        .ok_or_else(|| ConfigError::Tls(format!("no private key in {}", path.display())))
}

fn root_store(ca: &Path) -> Result<RootCertStore, ConfigError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca)? {
        roots
            .add(cert)
            .map_err(|e| ConfigError::Tls(format!("add CA cert: {}", e)))?;
    }
    Ok(roots)
}

/// Build the server-side TLS acceptor.
///
/// The client certificate is verified if given; connections without one pass
/// the handshake and are gated later by the CN admission check.
pub fn acceptor(paths: &TlsPaths) -> Result<TlsAcceptor, ConfigError> {
    let (Some(ca), Some(cert), Some(key)) = (&paths.ca, &paths.cert, &paths.key) else {
        return Err(ConfigError::Tls("incomplete TLS material".to_string()));
    };

    let roots = root_store(ca)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .allow_unauthenticated()
        .build()
        .map_err(|e| ConfigError::Tls(format!("client verifier: {}", e)))?;

    let mut config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(load_certs(cert)?, load_key(key)?)
        .map_err(|e| ConfigError::Tls(format!("server identity: {}", e)))?;
    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the client-side TLS connector with mutual authentication.
pub fn connector(paths: &TlsPaths) -> Result<TlsConnector, ConfigError> {
    let Some(ca) = &paths.ca else {
        return Err(ConfigError::Tls("incomplete TLS material".to_string()));
    };

    let builder = ClientConfig::builder().with_root_certificates(root_store(ca)?);
    let mut config = match (&paths.cert, &paths.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|e| ConfigError::Tls(format!("client identity: {}", e)))?,
        _ => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parse a hostname into a rustls server name.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConfigError> {
    ServerName::try_from(host.to_string())
        .map_err(|e| ConfigError::Tls(format!("invalid server name {}: {}", host, e)))
}

/// Extract the Subject Common Name from the first certificate of a peer
/// chain.
pub fn peer_common_name(chain: &[CertificateDer<'_>]) -> Option<String> {
    let cert = chain.first()?;
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).ok()?;
    let name = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsPaths;
    use std::path::PathBuf;

    #[test]
    fn test_load_certs_missing_file() {
        let result = load_certs(Path::new("/no/such/ca.pem"));
        assert!(matches!(result, Err(ConfigError::Tls(_))));
    }

    #[test]
    fn test_acceptor_requires_full_material() {
        let paths = TlsPaths {
            ca: Some(PathBuf::from("/certs/ca.pem")),
            cert: None,
            key: None,
        };
        assert!(matches!(acceptor(&paths), Err(ConfigError::Tls(_))));
    }

    #[test]
    fn test_peer_common_name_empty_chain() {
        assert_eq!(peer_common_name(&[]), None);
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        assert!(server_name("not a hostname").is_err());
    }
}
