//! Client for the Liquidsoap server command protocol.
//!
//! Liquidsoap exposes a line-oriented control interface over TCP telnet or
//! a Unix domain socket. Commands go out as single newline-terminated
//! lines; each response is a block of text closed by a sentinel marker.
//! The server drops idle connections after a short timeout, so the client
//! reconnects transparently.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     one command line      ┌──────────────────┐
//! │   liqshell   │ ────────────────────────► │    liquidsoap    │
//! │ (Connection) │ ◄──────────────────────── │  command server  │
//! └──────────────┘   text + "\r\nEND\r\n"    └──────────────────┘
//! ```
//!
//! # Protocol
//!
//! ```text
//! client: version\n
//! server: Liquidsoap 2.2.0\r\nEND\r\n
//!
//! client: quit\n
//! server: Bye!\r\n            (and closes the connection)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use liqshell::proto::{Connection, ServerAddr};
//!
//! let mut conn = Connection::new(ServerAddr::parse("localhost:1234")?);
//! let uptime = conn.send("uptime").await?;
//! conn.close().await;
//! ```

mod addr;
mod client;
mod framing;
mod transport;

pub use addr::ServerAddr;
pub use client::{with_connection, Connection, ConnectionError};
pub use framing::{END_MARKER, QUIT_COMMAND, QUIT_MARKER};
