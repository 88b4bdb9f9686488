//! Operator-facing output.
//!
//! stdout gets one line per bind and one per session start and end; stderr
//! gets `ERROR: <message>` for every surfaced failure. These lines are the
//! relay's external interface and are kept separate from `tracing` output.

use std::fmt::Display;
use std::net::SocketAddr;

use crate::proxy::Session;

/// `listen <port>`
pub fn listen_line(addr: SocketAddr) -> String {
    format!("listen {}", addr.port())
}

/// `<mode> <client> -> <destination> secure=<bool>`
pub fn session_start_line(session: &Session) -> String {
    format!(
        "{} {} -> {} secure={}",
        session.relay_mode(),
        session.client_addr(),
        session.destination(),
        session.is_secure()
    )
}

/// `closed <client> -> <destination> secure=<bool>`
pub fn session_end_line(session: &Session) -> String {
    format!(
        "closed {} -> {} secure={}",
        session.client_addr(),
        session.destination(),
        session.is_secure()
    )
}

pub fn listen(addr: SocketAddr) {
    println!("{}", listen_line(addr));
}

pub fn session_start(session: &Session) {
    println!("{}", session_start_line(session));
}

pub fn session_end(session: &Session) {
    println!("{}", session_end_line(session));
}

pub fn error(message: impl Display) {
    eprintln!("ERROR: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{Destination, RelayMode};

    #[test]
    fn test_lines() {
        let session = Session::new(
            "198.51.100.4:50123".parse().unwrap(),
            Destination::new("db.internal", 5432),
            RelayMode::ProxyHeader,
            true,
        );

        assert_eq!(
            listen_line("0.0.0.0:8080".parse().unwrap()),
            "listen 8080"
        );
        assert_eq!(
            session_start_line(&session),
            "proxy 198.51.100.4:50123 -> db.internal:5432 secure=true"
        );
        assert_eq!(
            session_end_line(&session),
            "closed 198.51.100.4:50123 -> db.internal:5432 secure=true"
        );
    }
}
