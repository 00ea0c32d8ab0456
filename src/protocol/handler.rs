//! Connection handler for the line acknowledgment protocol.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{info, trace};

use super::parser::strip_line_ending;
use super::CLIENT_MESSAGE_TAG;

const INITIAL_LINE_CAPACITY: usize = 256;

/// What happened on a connection that ended cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Lines received and acknowledged.
    pub lines: u64,
}

/// Handle an accepted TCP connection until the peer closes it.
pub async fn handle_stream(
    stream: TcpStream,
    peer: SocketAddr,
    ack: &[u8],
) -> io::Result<ConnectionSummary> {
    let (reader, writer) = stream.into_split();
    handle_connection(BufReader::new(reader), writer, ack, peer).await
}

/// Read lines from `reader` and answer each one with `ack` on `writer`.
///
/// `ack` must already carry its line terminator. Returns when the reader
/// reaches end-of-stream; any read or write error is returned as is and
/// the caller drops both halves.
pub async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ack: &[u8],
    peer: SocketAddr,
) -> io::Result<ConnectionSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(INITIAL_LINE_CAPACITY);
    let mut summary = ConnectionSummary::default();

    loop {
        line.clear();

        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            trace!(peer = %peer, "Connection closed by client");
            return Ok(summary);
        }

        let text = String::from_utf8_lossy(strip_line_ending(&line));
        info!(peer = %peer, "{CLIENT_MESSAGE_TAG} {text}");

        writer.write_all(ack).await?;
        writer.flush().await?;
        summary.lines += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const ACK: &[u8] = b"Servidor: Mensaje recibido\n";

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_ack_per_line() {
        let mock = Builder::new()
            .read(b"hello\n")
            .write(ACK)
            .read(b"second line\r\n")
            .write(ACK)
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let summary = handle_connection(BufReader::new(reader), writer, ACK, peer())
            .await
            .unwrap();
        assert_eq!(summary.lines, 2);
    }

    #[tokio::test]
    async fn test_lines_in_one_segment() {
        let mock = Builder::new()
            .read(b"one\ntwo\nthree\n")
            .write(ACK)
            .write(ACK)
            .write(ACK)
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let summary = handle_connection(BufReader::new(reader), writer, ACK, peer())
            .await
            .unwrap();
        assert_eq!(summary.lines, 3);
    }

    #[tokio::test]
    async fn test_immediate_close() {
        let mock = Builder::new().build();
        let (reader, writer) = tokio::io::split(mock);

        let summary = handle_connection(BufReader::new(reader), writer, ACK, peer())
            .await
            .unwrap();
        assert_eq!(summary, ConnectionSummary::default());
    }

    #[tokio::test]
    async fn test_unterminated_last_line() {
        let input: &[u8] = b"first\nlast";
        let mut output = Vec::new();

        let summary = handle_connection(input, &mut output, ACK, peer())
            .await
            .unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(output, [ACK, ACK].concat());
    }

    #[tokio::test]
    async fn test_invalid_utf8_still_acknowledged() {
        let input: &[u8] = b"\xff\xfe bytes\n";
        let mut output = Vec::new();

        let summary = handle_connection(input, &mut output, ACK, peer())
            .await
            .unwrap();
        assert_eq!(summary.lines, 1);
        assert_eq!(output, ACK);
    }

    #[tokio::test]
    async fn test_read_error_aborts() {
        let mock = Builder::new()
            .read(b"hi\n")
            .write(ACK)
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let err = handle_connection(BufReader::new(reader), writer, ACK, peer())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_write_error_aborts() {
        let mock = Builder::new()
            .read(b"hi\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let err = handle_connection(BufReader::new(reader), writer, ACK, peer())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
