//! TCP listener and accept loop.
//!
//! The listener binds the local port, optionally terminates TLS with an
//! ephemeral self-signed identity, and hands every accepted connection to
//! the [`Dispatcher`] on its own task. The TLS handshake runs inside that
//! task, so a slow or failing client never holds up the accept loop.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, Instrument};

use super::cert::{CertificateIdentity, DEFAULT_TLS_HOST};
use super::dialer::{BoxedStream, Connect, Destination, Dialer, DEFAULT_CONNECT_TIMEOUT};
use super::pipe::JoinPolicy;
use super::session::{Dispatcher, RelayMode};
use crate::console;
use crate::error::{ServeError, SessionError};

/// How the listener treats inbound connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolMode {
    /// Raw TCP.
    #[default]
    Plain,
    /// TLS terminated with a self-signed certificate.
    Tls,
}

/// Configuration for a listener. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Where every session is relayed.
    pub destination: Destination,
    /// Plain or TLS-terminating.
    pub protocol: ProtocolMode,
    /// Whether a PROXY v1 header precedes the payload.
    pub relay_mode: RelayMode,
    /// Dial the destination over TLS.
    pub secure_destination: bool,
    /// Host name for the self-signed certificate.
    pub tls_host: String,
    /// Destination connect timeout.
    pub connect_timeout: Duration,
    /// When a relay counts as finished.
    pub join_policy: JoinPolicy,
}

impl ListenerConfig {
    /// Create a plain TCP relay configuration.
    pub fn new(bind_addr: SocketAddr, destination: Destination) -> Self {
        Self {
            bind_addr,
            destination,
            protocol: ProtocolMode::Plain,
            relay_mode: RelayMode::Tcp,
            secure_destination: false,
            tls_host: DEFAULT_TLS_HOST.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            join_policy: JoinPolicy::WaitBoth,
        }
    }
}

/// A bound relay listener.
pub struct Listener {
    listener: TcpListener,
    identity: Option<CertificateIdentity>,
    acceptor: Option<TlsAcceptor>,
    dispatcher: Dispatcher,
}

impl Listener {
    /// Bind the listener and prepare TLS and the dialer.
    pub async fn bind(config: ListenerConfig) -> Result<Self, ServeError> {
        let dialer = Dialer::new(
            config.destination.clone(),
            config.secure_destination,
            config.connect_timeout,
        )?;
        Self::bind_with_connector(config, Arc::new(dialer)).await
    }

    /// Bind the listener with a custom outbound connector.
    pub async fn bind_with_connector(
        config: ListenerConfig,
        connector: Arc<dyn Connect>,
    ) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServeError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServeError::LocalAddr)?;

        let (identity, acceptor) = match config.protocol {
            ProtocolMode::Plain => (None, None),
            ProtocolMode::Tls => {
                let identity = CertificateIdentity::generate(&config.tls_host)?;
                let acceptor = identity.tls_acceptor()?;
                (Some(identity), Some(acceptor))
            }
        };

        info!(
            bind_addr = %local_addr,
            destination = %config.destination,
            protocol = ?config.protocol,
            relay_mode = %config.relay_mode,
            secure_destination = config.secure_destination,
            join_policy = %config.join_policy,
            "Listener bound"
        );
        console::listen(local_addr);

        Ok(Self {
            listener,
            identity,
            acceptor,
            dispatcher: Dispatcher::new(connector, config.relay_mode, config.join_policy),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The TLS identity, when terminating TLS.
    pub fn identity(&self) -> Option<&CertificateIdentity> {
        self.identity.as_ref()
    }

    /// Accept connections forever. Returns only on a listener-level accept
    /// failure; a connection that dies before it is accepted is skipped.
    pub async fn run(self) -> Result<Infallible, ServeError> {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    debug!(error = %e, "Connection lost before accept");
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "Accept error");
                    return Err(ServeError::Accept(e));
                }
            };

            let acceptor = self.acceptor.clone();
            let dispatcher = self.dispatcher.clone();

            tokio::spawn(
                async move {
                    let inbound = match accept_inbound(stream, peer_addr, acceptor).await {
                        Ok(inbound) => inbound,
                        Err(e) => {
                            console::error(&e);
                            debug!(reason = e.reason_code(), error = %e, "Handshake failed");
                            return;
                        }
                    };

                    // Outcome is logged by the dispatcher.
                    let _ = dispatcher.dispatch(inbound, peer_addr).await;
                }
                .instrument(tracing::info_span!("session", peer = %peer_addr)),
            );
        }
    }
}

/// Bind and serve `config` until a fatal error.
pub async fn serve(config: ListenerConfig) -> Result<Infallible, ServeError> {
    Listener::bind(config).await?.run().await
}

/// Accept errors caused by one peer rather than by the listening socket.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Complete the listener-side TLS handshake when terminating TLS.
async fn accept_inbound(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
) -> Result<BoxedStream, SessionError> {
    let Some(acceptor) = acceptor else {
        return Ok(Box::new(stream));
    };

    match acceptor.accept(stream).await {
        Ok(tls_stream) => Ok(Box::new(tls_stream)),
        Err(source) => Err(SessionError::TlsAccept { peer_addr, source }),
    }
}
