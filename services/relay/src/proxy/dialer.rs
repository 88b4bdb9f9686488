//! Outbound connections to the destination.
//!
//! The dialer opens a TCP connection with a bounded connect timeout and,
//! when the destination is marked secure, runs a TLS client handshake on
//! top of it. Secure dialing exists to reach TLS-only backends, which are
//! usually self-signed or internal, so the peer certificate chain is never
//! validated. Handshake signatures are still checked.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ConfigError, DialError};

/// Default connect timeout for destination connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Byte stream the relay can copy through: plain TCP or TLS over TCP.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Owned, type-erased connection. Dropping it closes the socket.
pub type BoxedStream = Box<dyn AsyncStream>;

/// The fixed relay destination, `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    /// Create a destination from a host (name or IP literal) and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Destination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidDestination(s.to_string());

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Source of outbound connections for sessions.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Where connections go.
    fn destination(&self) -> &Destination;

    /// Whether connections are TLS-wrapped.
    fn is_secure(&self) -> bool;

    /// Open one outbound connection.
    async fn connect(&self) -> Result<BoxedStream, DialError>;
}

/// Dials the configured destination over TCP, optionally wrapped in TLS.
#[derive(Clone)]
pub struct Dialer {
    destination: Destination,
    connect_timeout: Duration,
    tls: Option<TlsConnector>,
}

impl fmt::Debug for Dialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialer")
            .field("destination", &self.destination)
            .field("connect_timeout", &self.connect_timeout)
            .field("secure", &self.tls.is_some())
            .finish()
    }
}

impl Dialer {
    /// Create a dialer. `secure` enables TLS without chain verification.
    pub fn new(
        destination: Destination,
        secure: bool,
        connect_timeout: Duration,
    ) -> Result<Self, DialError> {
        let tls = if secure {
            Some(insecure_tls_connector()?)
        } else {
            None
        };

        Ok(Self {
            destination,
            connect_timeout,
            tls,
        })
    }

    /// Budget for the whole dial, TCP connect and TLS handshake included.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// TCP connect and, when secure, the TLS handshake. Unbounded.
    async fn dial(&self) -> Result<BoxedStream, DialError> {
        let target = (self.destination.host(), self.destination.port());
        let stream = TcpStream::connect(target)
            .await
            .map_err(|source| DialError::Connect {
                destination: self.destination.to_string(),
                source,
            })?;

        let Some(connector) = &self.tls else {
            return Ok(Box::new(stream));
        };

        let server_name = ServerName::try_from(self.destination.host().to_string()).map_err(
            |_| DialError::InvalidServerName {
                destination: self.destination.to_string(),
            },
        )?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|source| DialError::Handshake {
                destination: self.destination.to_string(),
                source,
            })?;

        debug!(destination = %self.destination, "TLS handshake with destination complete");
        Ok(Box::new(tls_stream))
    }
}

#[async_trait]
impl Connect for Dialer {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// One deadline covers the TCP connect and the TLS handshake together.
    async fn connect(&self) -> Result<BoxedStream, DialError> {
        debug!(
            destination = %self.destination,
            secure = self.is_secure(),
            "Dialing destination"
        );

        match timeout(self.connect_timeout, self.dial()).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout {
                destination: self.destination.to_string(),
                after: self.connect_timeout,
            }),
        }
    }
}

/// TLS connector that accepts any server certificate.
fn insecure_tls_connector() -> Result<TlsConnector, DialError> {
    let provider = rustls::crypto::ring::default_provider();
    let algorithms = provider.signature_verification_algorithms;

    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(SkipChainVerification(algorithms)))
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts any certificate chain; still verifies handshake signatures.
#[derive(Debug)]
struct SkipChainVerification(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for SkipChainVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}
