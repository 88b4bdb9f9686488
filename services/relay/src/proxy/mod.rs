//! L4 TCP relay implementation.
//!
//! This module provides:
//! - TCP listener management, optionally terminating TLS
//! - Ephemeral self-signed certificates for TLS termination
//! - Destination dialing, plain or TLS
//! - PROXY protocol v1 injection
//! - Bidirectional copy with an explicit join policy
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> (TLS accept) -> Dispatcher -> Dialer -> Destination
//!                                           |
//!                              PROXY v1 Header (if enabled)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{Destination, Listener, ListenerConfig};
//!
//! let config = ListenerConfig::new("0.0.0.0:8080".parse()?, "db:5432".parse()?);
//! let listener = Listener::bind(config).await?;
//! listener.run().await?;
//! ```

mod cert;
mod dialer;
mod listener;
mod pipe;
mod proxy_protocol;
mod session;

pub use cert::{CertificateIdentity, CERT_ORGANIZATION, CERT_VALIDITY, DEFAULT_TLS_HOST};
pub use dialer::{
    AsyncStream, BoxedStream, Connect, Destination, Dialer, DEFAULT_CONNECT_TIMEOUT,
};
pub use listener::{serve, Listener, ListenerConfig, ProtocolMode};
pub use pipe::{relay, JoinPolicy, RelayStats, COPY_BUFFER_SIZE};
pub use proxy_protocol::{
    parse_proxy_v1, write_proxy_header, ProxyHeaderV1, ADVERTISED_DESTINATION_IP,
};
pub use session::{Dispatcher, RelayMode, Session, SessionState};
