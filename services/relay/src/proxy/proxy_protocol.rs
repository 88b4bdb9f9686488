//! PROXY protocol v1 header generation.
//!
//! In proxy mode the first bytes written to the destination are a single
//! human-readable line:
//!
//! ```text
//! PROXY TCP4 <client-ip> 127.0.0.1 <client-port> <destination-port>\r\n
//! ```
//!
//! The family token is always `TCP4` and the destination address is always
//! the loopback literal, not the relay's bind address. Only the client
//! address is meaningful to the receiver.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Protocol signature that starts every v1 header.
const PROXY_V1_SIGNATURE: &str = "PROXY";

/// Transport family token.
const FAMILY_TCP4: &str = "TCP4";

/// Destination address advertised in the header.
pub const ADVERTISED_DESTINATION_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Longest legal v1 header, CRLF included.
pub const MAX_HEADER_LEN: usize = 107;

/// PROXY protocol v1 header for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeaderV1 {
    /// Original client address as seen by the listener.
    pub client_addr: SocketAddr,
    /// Destination port the relay dials.
    pub destination_port: u16,
}

impl ProxyHeaderV1 {
    /// Create a header for the given client and destination port.
    pub fn new(client_addr: SocketAddr, destination_port: u16) -> Self {
        Self {
            client_addr,
            destination_port,
        }
    }

    /// Header line, CRLF included.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Write the header and flush it before any payload follows.
    pub async fn write_to<W>(&self, outbound: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        outbound.write_all(self.encode().as_bytes()).await?;
        outbound.flush().await
    }
}

impl fmt::Display for ProxyHeaderV1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PROXY_V1_SIGNATURE} {FAMILY_TCP4} {} {ADVERTISED_DESTINATION_IP} {} {}\r\n",
            client_ip(self.client_addr.ip()),
            self.client_addr.port(),
            self.destination_port,
        )
    }
}

/// Client IP as written in the header; IPv4-mapped IPv6 is unmapped.
fn client_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// Write a PROXY v1 header for `client_addr` to `outbound`.
pub async fn write_proxy_header<W>(
    outbound: &mut W,
    client_addr: SocketAddr,
    destination_port: u16,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    ProxyHeaderV1::new(client_addr, destination_port)
        .write_to(outbound)
        .await
}

/// Parse a v1 header from the start of `data`.
///
/// Returns the header and the number of bytes it occupies, or `None` if
/// `data` does not begin with a complete `TCP4` header.
pub fn parse_proxy_v1(data: &[u8]) -> Option<(ProxyHeaderV1, usize)> {
    let window = &data[..data.len().min(MAX_HEADER_LEN)];
    let end = window.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&window[..end]).ok()?;

    let mut fields = line.split(' ');
    if fields.next()? != PROXY_V1_SIGNATURE || fields.next()? != FAMILY_TCP4 {
        return None;
    }
    let src_ip: IpAddr = fields.next()?.parse().ok()?;
    let _dst_ip: IpAddr = fields.next()?.parse().ok()?;
    let src_port: u16 = fields.next()?.parse().ok()?;
    let dst_port: u16 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    Some((
        ProxyHeaderV1::new(SocketAddr::new(src_ip, src_port), dst_port),
        end + 2,
    ))
}
