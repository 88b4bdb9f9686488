//! Per-connection dispatch.
//!
//! A session pairs one accepted connection with one dialed connection and
//! moves through `Accepted -> Dialing -> (HeaderWrite) -> Relaying -> Closed`.
//! Both streams are owned by the session run and dropped, closing them,
//! before the session is reported closed, whichever stage fails.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, trace};

use super::dialer::{BoxedStream, Connect, Destination};
use super::pipe::{relay, JoinPolicy, RelayStats};
use super::proxy_protocol::write_proxy_header;
use crate::console;
use crate::error::SessionError;

/// What is written to the destination before payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Payload only.
    #[default]
    Tcp,
    /// A PROXY v1 header, then payload.
    ProxyHeader,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::ProxyHeader => f.write_str("proxy"),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Dialing,
    HeaderWrite,
    Relaying,
    Closed,
}

/// One relayed connection.
#[derive(Debug, Clone)]
pub struct Session {
    client_addr: SocketAddr,
    destination: Destination,
    relay_mode: RelayMode,
    secure: bool,
    state: SessionState,
}

impl Session {
    /// A freshly accepted session.
    pub fn new(
        client_addr: SocketAddr,
        destination: Destination,
        relay_mode: RelayMode,
        secure: bool,
    ) -> Self {
        Self {
            client_addr,
            destination,
            relay_mode,
            secure,
            state: SessionState::Accepted,
        }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn relay_mode(&self) -> RelayMode {
        self.relay_mode
    }

    /// Whether the destination leg is TLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

/// Runs sessions against a destination.
#[derive(Clone)]
pub struct Dispatcher {
    connector: Arc<dyn Connect>,
    relay_mode: RelayMode,
    join_policy: JoinPolicy,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn Connect>,
        relay_mode: RelayMode,
        join_policy: JoinPolicy,
    ) -> Self {
        Self {
            connector,
            relay_mode,
            join_policy,
        }
    }

    /// Relay one accepted connection to the destination.
    ///
    /// Failures are logged and returned; they never affect other sessions.
    pub async fn dispatch(
        &self,
        inbound: BoxedStream,
        client_addr: SocketAddr,
    ) -> Result<RelayStats, SessionError> {
        let mut session = Session::new(
            client_addr,
            self.connector.destination().clone(),
            self.relay_mode,
            self.connector.is_secure(),
        );
        console::session_start(&session);

        let result = self.run(&mut session, inbound).await;
        session.transition(SessionState::Closed);

        match &result {
            Ok(stats) => debug!(
                destination = %session.destination(),
                bytes_to_destination = stats.bytes_to_destination,
                bytes_to_client = stats.bytes_to_client,
                "Session closed"
            ),
            Err(e) => {
                console::error(e);
                debug!(
                    destination = %session.destination(),
                    reason = e.reason_code(),
                    error = %e,
                    "Session failed"
                );
            }
        }
        console::session_end(&session);

        result
    }

    /// Everything up to `Closed`. Streams are dropped on return.
    async fn run(
        &self,
        session: &mut Session,
        mut inbound: BoxedStream,
    ) -> Result<RelayStats, SessionError> {
        session.transition(SessionState::Dialing);
        let mut outbound = self.connector.connect().await?;

        if session.relay_mode() == RelayMode::ProxyHeader {
            session.transition(SessionState::HeaderWrite);
            write_proxy_header(
                &mut outbound,
                session.client_addr(),
                session.destination().port(),
            )
            .await
            .map_err(SessionError::HeaderWrite)?;
            trace!("PROXY v1 header sent");
        }

        session.transition(SessionState::Relaying);
        relay(&mut inbound, &mut outbound, self.join_policy)
            .await
            .map_err(SessionError::Relay)
    }
}
