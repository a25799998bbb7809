//! Server address parsing and transport selection.
//!
//! Liquidsoap exposes its command interface either on a TCP port
//! (`server.telnet`) or on a Unix domain socket (`server.socket`). A single
//! address string decides which transport the client opens: anything
//! containing a colon is `host:port`, everything else is a filesystem path.

use std::fmt;
use std::path::PathBuf;

use crate::proto::client::ConnectionError;

/// Where the command server lives, as selected by the address string.
///
/// The split is on the first colon, so `localhost:1234` is host
/// `localhost`, port `1234`. A consequence of the colon rule is that bare
/// IPv6 literals such as `::1` are parsed as a TCP address with an invalid
/// port and rejected; they are never treated as socket paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddr {
    /// TCP transport to `host:port`.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Unix domain socket transport to the socket file at this path.
    Unix(PathBuf),
}

impl ServerAddr {
    /// Parse an address string, choosing the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Address`] when the string contains a
    /// colon but the part after the first colon is not a 16-bit port
    /// number.
    pub fn parse(addr: &str) -> Result<Self, ConnectionError> {
        match addr.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| ConnectionError::Address {
                    addr: addr.to_string(),
                    reason: format!("invalid port {:?}", port),
                })?;
                Ok(ServerAddr::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(ServerAddr::Unix(PathBuf::from(addr))),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddr::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ServerAddr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}
