//! The reconnecting connection to the command server.
//!
//! `Connection` owns at most one live transport and performs strictly
//! sequential framed exchanges over it: write one command line, read until
//! the response terminator, hand back the decoded text. The server drops
//! idle connections after a short timeout, so the transport is re-opened
//! lazily whenever an exchange finds it absent.
//!
//! Loss detection and recovery are deliberately split: `send` only detects
//! a dead link, marks the connection disconnected and reports
//! [`ConnectionError::Lost`]; whether to retry (which transparently
//! reconnects) is the caller's decision.

use std::io;
use std::string::FromUtf8Error;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::proto::addr::ServerAddr;
use crate::proto::framing::{
    frame_request, read_reply, write_request, END_MARKER, QUIT_COMMAND, QUIT_MARKER,
};
use crate::proto::transport::Transport;

/// Upper bound on the goodbye exchange during [`Connection::close`].
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors surfaced by [`Connection`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Opening the transport failed (server down, refused, missing socket).
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        /// The address the connect was aimed at.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The address string is neither `host:port` nor usable as a path.
    #[error("invalid address {addr:?}: {reason}")]
    Address {
        /// The offending address string.
        addr: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An open connection died mid-exchange. The next `send` reconnects.
    #[error("connection lost")]
    Lost,

    /// The server reply was not valid UTF-8.
    #[error("malformed reply: {0}")]
    Encoding(#[from] FromUtf8Error),
}

impl ConnectionError {
    /// True for mid-exchange loss, the one failure worth a single retry.
    pub fn is_lost(&self) -> bool {
        matches!(self, ConnectionError::Lost)
    }
}

/// A lazily reconnecting client for the command protocol.
///
/// One `Connection` supports exactly one exchange at a time; `&mut self`
/// on every operation enforces the strict request/response discipline.
/// Creation is free: nothing touches the network until the first exchange.
///
/// # Connection Lifecycle
///
/// - [`Connection::new`] - record the address, stay disconnected
/// - [`Connection::send`] - connect if needed, run one framed exchange
/// - [`Connection::close`] - best-effort `quit`, then drop the transport
/// - [`Connection::disconnect`] - drop the transport with no goodbye
///
/// # Example
///
/// ```ignore
/// use liqshell::proto::{Connection, ServerAddr};
///
/// let mut conn = Connection::new(ServerAddr::parse("localhost:1234")?);
/// let version = conn.send("version").await?;
/// conn.close().await;
/// ```
#[derive(Debug)]
pub struct Connection {
    /// Where to (re)connect.
    addr: ServerAddr,
    /// The live transport, if any. `None` is the disconnected state.
    stream: Option<Transport>,
}

impl Connection {
    /// Create a disconnected connection for the given address.
    pub fn new(addr: ServerAddr) -> Self {
        Self { addr, stream: None }
    }

    /// The address this connection talks to.
    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    /// Whether a transport is currently open.
    ///
    /// Advisory: the server may already have dropped its side, which is
    /// only discovered by the next exchange.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one command and return the decoded response with the standard
    /// terminator stripped.
    pub async fn send(&mut self, command: &str) -> Result<String, ConnectionError> {
        self.send_with(command, END_MARKER).await
    }

    /// Send one command expecting a specific response terminator.
    ///
    /// Opens the transport first if none is live. On a dead link the
    /// connection is marked disconnected before [`ConnectionError::Lost`]
    /// is returned, so a later call reconnects transparently.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Connect`] if the transport cannot be opened
    /// - [`ConnectionError::Lost`] if the link dies mid-exchange
    /// - [`ConnectionError::Encoding`] if the reply is not valid UTF-8
    pub async fn send_with(
        &mut self,
        command: &str,
        terminator: &[u8],
    ) -> Result<String, ConnectionError> {
        let request = frame_request(command);
        let stream = self.transport().await?;

        let outcome = match write_request(stream, &request).await {
            Ok(()) => read_reply(stream, terminator).await,
            Err(err) => Err(err),
        };

        if matches!(outcome, Err(ConnectionError::Lost)) {
            debug!("connection to {} lost", self.addr);
            self.stream = None;
        }
        outcome
    }

    /// Gracefully shut the connection down.
    ///
    /// Best effort: tries one bounded `quit` exchange so the server can say
    /// `Bye!`, swallows any failure, then drops the transport. Safe to call
    /// repeatedly; on an already-closed connection this is a no-op.
    pub async fn close(&mut self) {
        if self.stream.is_none() {
            return;
        }
        match timeout(QUIT_TIMEOUT, self.send_with(QUIT_COMMAND, QUIT_MARKER)).await {
            Ok(Ok(_)) => debug!("server acknowledged quit"),
            Ok(Err(err)) => debug!("quit handshake failed: {}", err),
            Err(_) => debug!("quit handshake timed out"),
        }
        self.stream = None;
    }

    /// Drop the transport immediately, with no goodbye handshake.
    ///
    /// For abandoning an exchange that was cancelled mid-frame: the old
    /// transport may still carry the unread reply, which would otherwise
    /// surface as the answer to the next command. The next exchange opens
    /// a fresh transport.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("dropped the connection to {}", self.addr);
        }
    }

    /// The live transport, opening it first when disconnected.
    async fn transport(&mut self) -> Result<&mut Transport, ConnectionError> {
        if self.stream.is_none() {
            debug!("connecting to {}", self.addr);
            let transport =
                Transport::connect(&self.addr)
                    .await
                    .map_err(|source| ConnectionError::Connect {
                        addr: self.addr.to_string(),
                        source,
                    })?;
            self.stream = Some(transport);
        }
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(ConnectionError::Lost),
        }
    }
}

/// Run `body` against a connection and always close it afterwards.
///
/// The close runs on every exit path, success or error, and can itself
/// never fail, so the body's result comes back unmasked. The connection is
/// handed over disconnected; its first exchange opens the transport.
///
/// # Example
///
/// ```ignore
/// use futures::FutureExt;
///
/// let version = with_connection(addr, |conn| {
///     async move { conn.send("version").await }.boxed()
/// })
/// .await?;
/// ```
pub async fn with_connection<T, E, F>(addr: ServerAddr, body: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T, E>>,
{
    let mut conn = Connection::new(addr);
    let result = body(&mut conn).await;
    conn.close().await;
    result
}
