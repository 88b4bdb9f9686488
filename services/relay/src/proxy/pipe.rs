//! Bidirectional copy between the inbound and outbound connections.
//!
//! Each direction copies until its source reports EOF or an error. When a
//! direction reaches EOF the opposite connection's write half is shut down
//! gracefully (FIN, or close_notify for TLS) so the peer sees the
//! half-close; the connection itself stays open for the other direction.
//!
//! [`JoinPolicy`] decides when the relay as a whole is finished.

use std::fmt;
use std::io;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::ConfigError;

/// Working buffer per direction.
pub const COPY_BUFFER_SIZE: usize = 8192;

/// When a relay counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Both directions reached EOF, or either one failed.
    #[default]
    WaitBoth,
    /// The first direction to finish, cleanly or not, ends the relay.
    FirstDone,
}

impl FromStr for JoinPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(Self::WaitBoth),
            "first" => Ok(Self::FirstDone),
            other => Err(ConfigError::InvalidJoinPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitBoth => f.write_str("both"),
            Self::FirstDone => f.write_str("first"),
        }
    }
}

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    /// Inbound to outbound.
    pub bytes_to_destination: u64,
    /// Outbound to inbound.
    pub bytes_to_client: u64,
}

/// Copy `inbound <-> outbound` until the join policy is satisfied.
///
/// Under [`JoinPolicy::FirstDone`] the byte count of the unfinished
/// direction is not known and is reported as zero.
pub async fn relay<A, B>(
    inbound: &mut A,
    outbound: &mut B,
    policy: JoinPolicy,
) -> io::Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let (mut in_read, mut in_write) = tokio::io::split(inbound);
    let (mut out_read, mut out_write) = tokio::io::split(outbound);

    let to_destination = copy_half(&mut in_read, &mut out_write, "to_destination");
    let to_client = copy_half(&mut out_read, &mut in_write, "to_client");

    match policy {
        JoinPolicy::WaitBoth => {
            let (bytes_to_destination, bytes_to_client) =
                tokio::try_join!(to_destination, to_client)?;
            Ok(RelayStats {
                bytes_to_destination,
                bytes_to_client,
            })
        }
        JoinPolicy::FirstDone => {
            tokio::select! {
                result = to_destination => Ok(RelayStats {
                    bytes_to_destination: result?,
                    bytes_to_client: 0,
                }),
                result = to_client => Ok(RelayStats {
                    bytes_to_destination: 0,
                    bytes_to_client: result?,
                }),
            }
        }
    }
}

/// Copy one direction, then forward the EOF as a write shutdown.
async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    direction: &'static str,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            // TLS peer closed the socket without close_notify.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    trace!(direction, bytes = total, "EOF, shutting down write half");

    match writer.shutdown().await {
        Ok(()) => Ok(total),
        // Peer already gone entirely; the EOF has nowhere to go.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(total),
        Err(e) => Err(e),
    }
}
