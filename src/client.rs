//! Interactive client for the line acknowledgment protocol.
//!
//! Relays lines from an input source to the server and prints each reply.
//! Sentinel inputs (`exit` / `salir` by default) end the session locally
//! and are never sent.

use crate::protocol::{is_sentinel, strip_line_ending, SERVER_REPLY_TAG};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to server at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("connection closed by server")]
    ServerClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A connected session with the server.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    sentinels: Vec<String>,
    reply: Vec<u8>,
}

impl Session<BufReader<OwnedReadHalf>, OwnedWriteHalf> {
    /// Open a TCP connection to `addr`. No retries.
    pub async fn connect(addr: SocketAddr, sentinels: Vec<String>) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;
        info!(server = %addr, "Connected");

        let (reader, writer) = stream.into_split();
        Ok(Session::new(BufReader::new(reader), writer, sentinels))
    }
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, sentinels: Vec<String>) -> Self {
        Session {
            reader,
            writer,
            sentinels,
            reply: Vec::new(),
        }
    }

    /// Send one line and wait for exactly one reply line.
    pub async fn request(&mut self, line: &str) -> Result<String, ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        self.reply.clear();
        let n = self.reader.read_until(b'\n', &mut self.reply).await?;
        if n == 0 {
            return Err(ClientError::ServerClosed);
        }

        Ok(String::from_utf8_lossy(strip_line_ending(&self.reply)).into_owned())
    }

    /// Relay `input` lines until a sentinel or end of input.
    ///
    /// Each reply is written to `output` before the next input line is
    /// read. Returns the number of lines exchanged.
    pub async fn run<I, O>(&mut self, mut input: I, mut output: O) -> Result<u64, ClientError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let quit_hint = self.sentinels.first().map(String::as_str).unwrap_or("Ctrl-D");
        output
            .write_all(
                format!("Connected to server. Type a message (or '{quit_hint}' to quit):\n")
                    .as_bytes(),
            )
            .await?;
        output.flush().await?;

        let mut exchanged = 0;
        let mut line = String::new();

        loop {
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                debug!("End of input");
                break;
            }

            if is_sentinel(&line, &self.sentinels) {
                debug!("Sentinel entered, closing session");
                break;
            }

            let message = line.trim_end_matches(['\n', '\r']);
            let reply = self.request(message).await?;

            output
                .write_all(format!("{SERVER_REPLY_TAG} {reply}\n").as_bytes())
                .await?;
            output.flush().await?;
            exchanged += 1;
        }

        self.writer.shutdown().await?;
        Ok(exchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ACK_MESSAGE;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn sentinels() -> Vec<String> {
        vec!["exit".to_string(), "salir".to_string()]
    }

    fn ack_line() -> Vec<u8> {
        format!("{DEFAULT_ACK_MESSAGE}\n").into_bytes()
    }

    #[tokio::test]
    async fn test_request_reply_printed() {
        let ack = ack_line();
        let server = Builder::new().write(b"hello\n").read(&ack).build();
        let (reader, writer) = tokio::io::split(server);
        let mut session = Session::new(BufReader::new(reader), writer, sentinels());

        let input: &[u8] = b"hello\nexit\n";
        let mut output = Vec::new();
        let exchanged = session.run(input, &mut output).await.unwrap();

        assert_eq!(exchanged, 1);
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Connected to server. Type a message (or 'exit' to quit):\n"));
        assert!(output.ends_with("[RESPUESTA SERVIDOR] Servidor: Mensaje recibido\n"));
    }

    #[tokio::test]
    async fn test_each_reply_before_next_line() {
        let ack = ack_line();
        let server = Builder::new()
            .write(b"one\n")
            .read(&ack)
            .write(b"two\n")
            .read(&ack)
            .build();
        let (reader, writer) = tokio::io::split(server);
        let mut session = Session::new(BufReader::new(reader), writer, sentinels());

        let input: &[u8] = b"one\r\ntwo\n";
        let mut output = Vec::new();
        assert_eq!(session.run(input, &mut output).await.unwrap(), 2);

        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches(SERVER_REPLY_TAG).count(), 2);
    }

    #[tokio::test]
    async fn test_server_closed_before_reply() {
        let server = Builder::new().write(b"hello\n").build();
        let (reader, writer) = tokio::io::split(server);
        let mut session = Session::new(BufReader::new(reader), writer, sentinels());

        let err = session.request("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::ServerClosed));
    }

    #[tokio::test]
    async fn test_sentinel_not_transmitted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Records everything the client sends, acknowledging each line
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut received = Vec::new();
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line).await.unwrap() == 0 {
                    break;
                }
                received.extend_from_slice(&line);
                writer.write_all(&ack_line()).await.unwrap();
            }
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).await.unwrap();
            received.extend_from_slice(&rest);
            received
        });

        let mut session = Session::connect(addr, sentinels()).await.unwrap();
        let input: &[u8] = b"hello\nSALIR\nnever sent\n";
        let mut output = Vec::new();
        assert_eq!(session.run(input, &mut output).await.unwrap(), 1);
        drop(session);

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"hello\n");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Session::connect(addr, sentinels()).await.err().unwrap();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_against_server() {
        use crate::config::Config;
        use crate::server::Listener;

        let mut listener = Listener::new(Config {
            port: 0,
            ..Config::default()
        });
        let addr = listener.bind().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(listener.start_with_shutdown(async {
            let _ = stop_rx.await;
        }));

        let mut session = Session::connect(addr, sentinels()).await.unwrap();
        assert_eq!(session.request("hello").await.unwrap(), DEFAULT_ACK_MESSAGE);

        let input: &[u8] = b"a\nb\nexit\n";
        let mut output = Vec::new();
        assert_eq!(session.run(input, &mut output).await.unwrap(), 2);
        drop(session);

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
