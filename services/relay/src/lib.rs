pub mod config;
pub mod console;
pub mod error;
pub mod proxy;

pub use config::Cli;
pub use error::{ConfigError, CryptoError, DialError, ServeError, SessionError};
pub use proxy::{
    serve, CertificateIdentity, Connect, Destination, Dialer, Dispatcher, JoinPolicy, Listener,
    ListenerConfig, ProtocolMode, ProxyHeaderV1, RelayMode, RelayStats, Session,
};
