//! Relay configuration.
//!
//! The command line is positional and order-sensitive:
//!
//! ```text
//! proxy <from-port> <to-address> <protocol> [proxy] [secure]
//! ```
//!
//! It is parsed once at startup into an immutable [`ListenerConfig`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::proxy::{
    Destination, ListenerConfig, ProtocolMode, RelayMode, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_TLS_HOST,
};

/// Command line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "proxy", version, about = "Relay TCP connections to a fixed destination")]
pub struct Cli {
    /// Local TCP port to listen on.
    pub from_port: u16,

    /// Destination as host:port.
    pub to: String,

    /// One of tcp, http, https, tls, proxy.
    pub protocol: String,

    /// Extra modes: `proxy` (send a PROXY v1 header), `secure` (dial the destination over TLS).
    pub options: Vec<String>,

    /// Address to bind the listener on.
    #[arg(long = "bind", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_ip: IpAddr,

    /// Host name for the self-signed listener certificate.
    #[arg(long, default_value = DEFAULT_TLS_HOST)]
    pub tls_host: String,

    /// Destination connect timeout in seconds.
    #[arg(long = "connect-timeout", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout_secs: u64,

    /// When a session ends: `both` directions done, or `first` direction done.
    #[arg(long, default_value = "both")]
    pub join: String,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl TryFrom<&Cli> for ListenerConfig {
    type Error = ConfigError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let destination: Destination = cli.to.parse()?;

        let (protocol, mut relay_mode) = match cli.protocol.as_str() {
            "tcp" | "http" => (ProtocolMode::Plain, RelayMode::Tcp),
            "https" | "tls" => (ProtocolMode::Tls, RelayMode::Tcp),
            "proxy" => (ProtocolMode::Plain, RelayMode::ProxyHeader),
            other => return Err(ConfigError::UnknownProtocol(other.to_string())),
        };

        let mut secure_destination = false;
        for option in &cli.options {
            match option.as_str() {
                "proxy" => relay_mode = RelayMode::ProxyHeader,
                "secure" => secure_destination = true,
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }

        if cli.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut config = ListenerConfig::new(
            SocketAddr::new(cli.bind_ip, cli.from_port),
            destination,
        );
        config.protocol = protocol;
        config.relay_mode = relay_mode;
        config.secure_destination = secure_destination;
        config.tls_host = cli.tls_host.clone();
        config.connect_timeout = Duration::from_secs(cli.connect_timeout_secs);
        config.join_policy = cli.join.parse()?;

        Ok(config)
    }
}
