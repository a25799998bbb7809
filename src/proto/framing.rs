//! Sentinel-terminated framing for the command protocol.
//!
//! Commands go out as a single newline-terminated line; the server answers
//! with a block of text closed by a fixed byte sequence. Ordinary replies
//! end with `\r\nEND\r\n`; the `quit` command is acknowledged with
//! `Bye!\r\n`, after which the server closes the connection.
//!
//! Responses never contain the terminator as payload, so detection is a
//! plain suffix match on the accumulated reply buffer. The suffix may span
//! read boundaries, which is why the match runs against the whole buffer
//! after every read.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::proto::client::ConnectionError;

/// Terminator for ordinary command responses.
pub const END_MARKER: &[u8] = b"\r\nEND\r\n";

/// Terminator the server sends in direct reply to `quit`.
pub const QUIT_MARKER: &[u8] = b"Bye!\r\n";

/// The command that asks the server to end the session.
pub const QUIT_COMMAND: &str = "quit";

/// Read chunk size.
const BUFSIZE: usize = 4096;

/// How long a single read may stall before the loop polls again.
///
/// A polling guard, not a protocol deadline: an elapsed timeout is retried
/// until the terminator arrives or the peer closes the stream, so a slow
/// server never fails a successful exchange.
pub(crate) const RECV_POLL: Duration = Duration::from_millis(100);

/// Frame a command for the wire: trimmed text plus one trailing newline.
pub(crate) fn frame_request(command: &str) -> Vec<u8> {
    let mut request = command.trim().as_bytes().to_vec();
    request.push(b'\n');
    request
}

/// Write the full request, looping until every byte is on the wire.
///
/// A zero-length write or any I/O error means the peer is gone; both
/// surface as [`ConnectionError::Lost`].
pub(crate) async fn write_request<W>(writer: &mut W, request: &[u8]) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < request.len() {
        match writer.write(&request[written..]).await {
            Ok(0) => {
                debug!("write returned zero bytes, treating the link as dead");
                return Err(ConnectionError::Lost);
            }
            Ok(n) => written += n,
            Err(err) => {
                debug!("write failed: {}", err);
                return Err(ConnectionError::Lost);
            }
        }
    }
    writer.flush().await.map_err(|err| {
        debug!("flush failed: {}", err);
        ConnectionError::Lost
    })
}

/// Accumulate reply bytes until the buffer ends with `marker`, then strip
/// the marker and decode the rest as UTF-8.
///
/// A zero-length read (peer closed) or a read error surfaces as
/// [`ConnectionError::Lost`]. Malformed text surfaces as
/// [`ConnectionError::Encoding`]; by then the full frame has been
/// consumed, so the stream itself is still usable.
pub(crate) async fn read_reply<R>(reader: &mut R, marker: &[u8]) -> Result<String, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut reply: Vec<u8> = Vec::new();
    let mut chunk = [0u8; BUFSIZE];

    loop {
        match timeout(RECV_POLL, reader.read(&mut chunk)).await {
            // Poll guard elapsed, keep waiting for the server.
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!("peer closed the connection mid-reply");
                return Err(ConnectionError::Lost);
            }
            Ok(Ok(n)) => {
                reply.extend_from_slice(&chunk[..n]);
                if reply.ends_with(marker) {
                    reply.truncate(reply.len() - marker.len());
                    return Ok(String::from_utf8(reply)?);
                }
            }
            Ok(Err(err)) => {
                debug!("read failed: {}", err);
                return Err(ConnectionError::Lost);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Writer whose every write reports zero bytes accepted.
    struct ZeroWriter;

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn frame_request_trims_and_appends_newline() {
        assert_eq!(frame_request("version"), b"version\n");
        assert_eq!(frame_request("  uptime \n"), b"uptime\n");
        assert_eq!(frame_request(""), b"\n");
    }

    #[tokio::test]
    async fn read_reply_strips_the_terminator() {
        let (mut client, mut server) = duplex(1024);

        server
            .write_all(b"Liquidsoap 2.2.0\r\nEND\r\n")
            .await
            .expect("write failed");

        let reply = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect("read failed");

        assert_eq!(reply, "Liquidsoap 2.2.0");
    }

    #[tokio::test]
    async fn read_reply_keeps_interior_line_breaks() {
        let (mut client, mut server) = duplex(1024);

        server
            .write_all(b"ready\r\nplaying\r\nstopped\r\nEND\r\n")
            .await
            .expect("write failed");

        let reply = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect("read failed");

        assert_eq!(reply, "ready\r\nplaying\r\nstopped");
    }

    #[tokio::test]
    async fn terminator_split_across_reads_is_still_detected() {
        // A 4-byte pipe capacity forces every read to come back in slivers,
        // so the marker can never arrive in one chunk.
        let (mut client, server) = duplex(4);

        let writer = tokio::spawn(async move {
            let mut server = server;
            server
                .write_all(b"Liquidsoap 2.2.0\r\nEND\r\n")
                .await
                .expect("write failed");
        });

        let reply = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect("read failed");

        assert_eq!(reply, "Liquidsoap 2.2.0");
        writer.await.expect("writer panicked");
    }

    #[tokio::test]
    async fn slow_replies_outlive_the_poll_guard() {
        let (mut client, server) = duplex(1024);

        // Reply long after RECV_POLL has elapsed a few times.
        let writer = tokio::spawn(async move {
            let mut server = server;
            tokio::time::sleep(RECV_POLL * 3).await;
            server.write_all(b"pong\r\nEND\r\n").await.expect("write failed");
        });

        let reply = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect("read failed");

        assert_eq!(reply, "pong");
        writer.await.expect("writer panicked");
    }

    #[tokio::test]
    async fn peer_close_before_terminator_is_a_lost_connection() {
        let (mut client, mut server) = duplex(1024);

        server.write_all(b"Liquidsoap 2.2").await.expect("write failed");
        drop(server);

        let err = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect_err("should fail");

        assert!(matches!(err, ConnectionError::Lost));
    }

    #[tokio::test]
    async fn malformed_text_surfaces_an_encoding_error() {
        let (mut client, mut server) = duplex(1024);

        server
            .write_all(b"caf\xe9\r\nEND\r\n")
            .await
            .expect("write failed");

        let err = timeout(TEST_TIMEOUT, read_reply(&mut client, END_MARKER))
            .await
            .expect("test timed out")
            .expect_err("should fail");

        assert!(matches!(err, ConnectionError::Encoding(_)));
    }

    #[tokio::test]
    async fn write_request_delivers_across_small_buffers() {
        // The 4-byte capacity forces the request out in several writes.
        let (mut client, mut server) = duplex(4);
        let request = frame_request("request.push /music/a.mp3");

        let expected = request.clone();
        let exchange = async {
            let (write_result, seen) = tokio::join!(write_request(&mut client, &request), async {
                let mut seen = vec![0u8; expected.len()];
                server.read_exact(&mut seen).await.expect("read failed");
                seen
            });
            write_result.expect("write failed");
            seen
        };

        let seen = timeout(TEST_TIMEOUT, exchange).await.expect("test timed out");
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn write_to_a_closed_peer_is_a_lost_connection() {
        let (mut client, server) = duplex(8);
        drop(server);

        let err = timeout(
            TEST_TIMEOUT,
            write_request(&mut client, b"very long request that cannot fit\n"),
        )
        .await
        .expect("test timed out")
        .expect_err("should fail");

        assert!(matches!(err, ConnectionError::Lost));
    }

    #[tokio::test]
    async fn zero_length_write_is_a_lost_connection() {
        // Sockets report a gone peer as an error, but the AsyncWrite
        // contract also allows Ok(0); both mean nothing was delivered.
        let mut writer = ZeroWriter;

        let err = timeout(TEST_TIMEOUT, write_request(&mut writer, b"version\n"))
            .await
            .expect("test timed out")
            .expect_err("should fail");

        assert!(matches!(err, ConnectionError::Lost));
    }
}
