//! TCP listener and connection dispatcher.
//!
//! Binds the listening socket, accepts connections in a loop and hands
//! each one to the worker pool, where the line protocol handler serves it
//! until the client disconnects.

use crate::config::Config;
use crate::pool::{PoolClosed, WorkerPool};
use crate::protocol::{encode_line, handler};
use bytes::Bytes;
use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`Listener`].
///
/// `Created → Listening → (Accepting ⇄ Dispatching) → ShuttingDown → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Configured, no socket yet.
    Created,
    /// Socket bound, accept loop not started.
    Listening,
    /// Waiting for the next inbound connection.
    Accepting,
    /// Handing an accepted connection to the worker pool.
    Dispatching,
    /// No more connections are accepted; the pool is draining.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl ListenerState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Created, Listening)
                | (Created, ShuttingDown)
                | (Listening, Accepting)
                | (Listening, ShuttingDown)
                | (Accepting, Dispatching)
                | (Accepting, ShuttingDown)
                | (Dispatching, Accepting)
                | (Dispatching, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

/// Fatal listener errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error(transparent)]
    PoolClosed(#[from] PoolClosed),
}

/// Server instance
pub struct Listener {
    config: Config,
    socket: Option<TcpListener>,
    state: watch::Sender<ListenerState>,
}

impl Listener {
    /// Create a new listener; nothing is bound until [`Listener::bind`].
    pub fn new(config: Config) -> Self {
        let (state, _) = watch::channel(ListenerState::Created);
        Listener {
            config,
            socket: None,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Bound address, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Bind the listening socket and return its local address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let display_addr = format!("{}:{}", self.config.host, self.config.port);
        let bind_err = |source: io::Error| ServerError::Bind {
            addr: display_addr.clone(),
            source,
        };

        let addr = self
            .config
            .bind_addr()
            .map_err(|e| bind_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let socket = create_listener(addr, self.config.backlog)
            .and_then(TcpListener::from_std)
            .map_err(bind_err)?;
        let local = socket.local_addr().map_err(bind_err)?;

        self.socket = Some(socket);
        self.transition(ListenerState::Listening);
        Ok(local)
    }

    /// Bind if needed and serve connections until a fatal error.
    pub async fn start(self) -> Result<(), ServerError> {
        self.start_with_shutdown(future::pending::<()>()).await
    }

    /// Like [`Listener::start`], but stops accepting once `signal` resolves.
    ///
    /// Returns `Ok(())` only for a signalled shutdown.
    pub async fn start_with_shutdown<F>(mut self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let pool = WorkerPool::new(self.config.pool_size, self.config.queue_depth);

        let result = match self.bind() {
            Ok(addr) => {
                info!(
                    address = %addr,
                    pool_size = pool.size(),
                    queue_depth = self.config.queue_depth,
                    "Server listening"
                );
                self.accept_loop(&pool, signal).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(error = %e, "Server stopped on fatal error");
        }

        self.transition(ListenerState::ShuttingDown);
        // Release the port before waiting on in-flight connections
        self.socket.take();
        pool.shutdown(self.config.shutdown_timeout).await;
        self.transition(ListenerState::Stopped);

        result
    }

    async fn accept_loop<F>(&self, pool: &WorkerPool, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Some(socket) = self.socket.as_ref() else {
            return Err(ServerError::Accept(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener is not bound",
            )));
        };
        let ack = encode_line(&self.config.ack_message);
        tokio::pin!(signal);

        loop {
            self.transition(ListenerState::Accepting);

            let accepted = tokio::select! {
                biased;
                _ = &mut signal => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                accepted = socket.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    self.transition(ListenerState::Dispatching);
                    info!(peer = %peer, "New connection");

                    // A full queue blocks here, so the signal must still be polled
                    tokio::select! {
                        biased;
                        _ = &mut signal => {
                            info!(peer = %peer, "Shutdown requested while dispatching");
                            return Ok(());
                        }
                        submitted = pool.submit(serve_connection(stream, peer, ack.clone())) => {
                            submitted?;
                        }
                    }
                }
                Err(e) if is_transient_accept_error(&e) => {
                    warn!(error = %e, "Connection dropped before accept");
                }
                Err(e) => return Err(ServerError::Accept(e)),
            }
        }
    }

    fn transition(&self, next: ListenerState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug_assert!(
                state.can_transition_to(next),
                "illegal listener transition {state:?} -> {next:?}"
            );
            *state = next;
            true
        });
    }
}

/// Per-connection job run inside a worker slot.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, ack: Bytes) {
    match handler::handle_stream(stream, peer, &ack).await {
        Ok(summary) => info!(peer = %peer, lines = summary.lines, "Client disconnected"),
        Err(e) => warn!(peer = %peer, error = %e, "Connection I/O error"),
    }
}

/// Errors caused by the peer rather than the listening socket.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Create a non-blocking listening socket.
///
/// `SO_REUSEADDR` is set so a restart is not blocked by `TIME_WAIT`, but
/// not `SO_REUSEPORT`: a second listener on the same port fails to bind.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    debug!(address = %addr, backlog, "Listening socket created");
    Ok(socket.into())
}
