//! Transport targets and dialing
//!
//! Sessions run over plain TCP, mutual TLS, or unix sockets. This module
//! parses dial targets, establishes connections, and erases the transport
//! behind a single boxed alias once the byte stream is up.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::TlsConnector;

use crate::error::ConnectionError;
use crate::tls;

/// Any async byte stream a session connection can run over.
pub trait SessionIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SessionIo for T {}

/// An established connection with the transport erased.
pub type BoxedIo = Box<dyn SessionIo>;

/// Transport scheme of a dial target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP (`host:port`, `tcp://`, `http://`)
    Plain,
    /// Mutual TLS over TCP (`tls://`, `https://`)
    Tls,
    /// Unix-domain socket (`unix://path`)
    Unix,
}

/// A parsed dial target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: Scheme,
    /// `host:port` for TCP schemes, the socket path for unix
    pub address: String,
    /// Hostname used for TLS server-name verification
    pub host: String,
}

/// Parse one dial target, optionally carrying a scheme prefix.
pub fn parse_target(entry: &str) -> Result<Target, ConnectionError> {
    let entry = entry.trim();
    let (scheme, rest) = match entry.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("", entry),
    };

    let scheme = match scheme {
        "" | "tcp" | "http" => Scheme::Plain,
        "tls" | "https" => Scheme::Tls,
        "unix" => Scheme::Unix,
        other => return Err(ConnectionError::UnknownScheme(other.to_string())),
    };

    let host = match scheme {
        Scheme::Unix => String::new(),
        _ => rest
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(rest)
            .to_string(),
    };

    Ok(Target {
        scheme,
        address: rest.to_string(),
        host,
    })
}

fn invalid_input(message: String) -> ConnectionError {
    ConnectionError::Transport(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message,
    ))
}

/// Establish a connection to a target.
pub async fn dial(target: &Target, tls: Option<&TlsConnector>) -> Result<BoxedIo, ConnectionError> {
    match target.scheme {
        Scheme::Plain => {
            let stream = TcpStream::connect(&target.address)
                .await
                .map_err(ConnectionError::Transport)?;
            Ok(Box::new(stream))
        }
        Scheme::Tls => {
            let Some(tls) = tls else {
                return Err(invalid_input(
                    "TLS target but no TLS material configured".to_string(),
                ));
            };
            let tcp = TcpStream::connect(&target.address)
                .await
                .map_err(ConnectionError::Transport)?;
            let name = tls::server_name(&target.host).map_err(|e| invalid_input(e.to_string()))?;
            let stream = tls
                .connect(name, tcp)
                .await
                .map_err(ConnectionError::Transport)?;
            Ok(Box::new(stream))
        }
        Scheme::Unix => {
            let stream = UnixStream::connect(&target.address)
                .await
                .map_err(ConnectionError::Transport)?;
            match tls {
                // Mutual TLS over the socket when material is configured
                Some(tls) => {
                    let name =
                        tls::server_name("localhost").map_err(|e| invalid_input(e.to_string()))?;
                    let stream = tls
                        .connect(name, stream)
                        .await
                        .map_err(ConnectionError::Transport)?;
                    Ok(Box::new(stream))
                }
                None => Ok(Box::new(stream)),
            }
        }
    }
}
