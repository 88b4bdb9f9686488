//! Error types for the relay.
//!
//! Errors are split by blast radius: [`ServeError`] and [`ConfigError`] end
//! the process, [`SessionError`] (and the [`DialError`] it wraps) only end
//! the session that produced it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Failure to produce the listener's TLS identity.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(#[source] rcgen::Error),

    /// Certificate parameters were rejected.
    #[error("invalid certificate parameters: {0}")]
    Params(#[source] rcgen::Error),

    /// Self-signing the certificate failed.
    #[error("certificate signing failed: {0}")]
    Signing(#[source] rcgen::Error),

    /// rustls refused the generated identity.
    #[error("tls server config: {0}")]
    ServerConfig(#[from] rustls::Error),
}

/// Failure to reach the destination.
#[derive(Debug, Error)]
pub enum DialError {
    /// TCP connect or TLS handshake did not finish in time.
    #[error("dial {destination}: timed out after {after:?}")]
    Timeout { destination: String, after: Duration },

    /// TCP connect failed (refused, unreachable, resolution failure).
    #[error("dial {destination}: {source}")]
    Connect {
        destination: String,
        #[source]
        source: io::Error,
    },

    /// Destination host cannot be used as a TLS server name.
    #[error("dial {destination}: invalid tls server name")]
    InvalidServerName { destination: String },

    /// TLS client handshake failed.
    #[error("dial {destination}: tls handshake: {source}")]
    Handshake {
        destination: String,
        #[source]
        source: io::Error,
    },

    /// TLS client config could not be built.
    #[error("tls client config: {0}")]
    ClientConfig(#[from] rustls::Error),
}

/// Errors that tear down a single session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Listener-side TLS handshake failed.
    #[error("tls accept from {peer_addr}: {source}")]
    TlsAccept {
        peer_addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Destination could not be dialed.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// PROXY header could not be written to the destination.
    #[error("write proxy header: {0}")]
    HeaderWrite(#[source] io::Error),

    /// I/O failure while relaying payload.
    #[error("relay: {0}")]
    Relay(#[source] io::Error),
}

impl SessionError {
    /// Short stable code for structured logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SessionError::TlsAccept { .. } => "tls_accept_failed",
            SessionError::Dial(_) => "dial_failed",
            SessionError::HeaderWrite(_) => "header_write_failed",
            SessionError::Relay(_) => "relay_io_error",
        }
    }
}

/// Invalid command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("invalid destination {0:?}: expected host:port")]
    InvalidDestination(String),

    #[error("invalid join policy: {0}")]
    InvalidJoinPolicy(String),

    #[error("connect timeout must be greater than zero")]
    ZeroTimeout,
}

/// Errors that stop the listener and the process.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("listen {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("generate certificate: {0}")]
    Certificate(#[from] CryptoError),

    #[error("dialer: {0}")]
    Dialer(#[from] DialError),

    #[error("accept: {0}")]
    Accept(#[source] io::Error),

    #[error("local address: {0}")]
    LocalAddr(#[source] io::Error),
}
