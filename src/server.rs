//! TCP server for the echo fixture.
//!
//! Accepts connections, reads one HTTP request from each, answers with a
//! JSON description of that request and closes the connection.

use crate::config::Config;
use crate::http::{self, Method, ParseResult, RequestHead, Response, Status};
use crate::logging;
use crate::payload;
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 1024;

/// Read buffer size
const BUFFER_SIZE: usize = 8 * 1024;

/// Time allowed for reading the request, and again for writing the response
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest POST body the server will read
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Server instance
pub struct Server {
    listener: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e))?;

        Ok(Server {
            listener,
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` resolves. Connections already accepted are
    /// left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(address = %addr, "Server listening");

        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = self.connection_limit.clone().acquire_owned() => permit
                    .map_err(|_| ServerError::Io(io::Error::other("connection limiter closed")))?,
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");

                        tokio::spawn(async move {
                            match handle_connection(stream).await {
                                Ok(()) => trace!(peer = %peer, "Connection closed"),
                                Err(ConnectionError::Timeout) => {
                                    debug!(peer = %peer, "Request timed out")
                                }
                                Err(e) => warn!(peer = %peer, error = %e, "Connection error"),
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        info!("Shutdown signal received");
        Ok(())
    }
}

/// Ctrl-C, or SIGTERM on unix.
///
/// Handlers are registered by `install`, so an interrupt that arrives before
/// `recv` is polled is still delivered to it.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignal {
    /// Register the signal handlers. Must be called inside the runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(ShutdownSignal {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(windows)]
        {
            Ok(ShutdownSignal {
                ctrl_c: tokio::signal::windows::ctrl_c()?,
            })
        }
    }

    /// Resolve on the first signal received.
    pub async fn recv(mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => {}
                _ = self.terminate.recv() => {}
            }
        }

        #[cfg(windows)]
        {
            self.ctrl_c.recv().await;
        }
    }
}

/// What to do with a connection once its request has been read.
enum Exchange {
    /// Write this response and log `summary`.
    Respond { summary: String, response: Response },
    /// The peer went away before sending a complete request head.
    Closed,
}

impl Exchange {
    fn reject(status: Status, message: String) -> Result<Self, ConnectionError> {
        let body = payload::error(message.clone()).to_json()?;
        Ok(Exchange::Respond {
            summary: format!("code {}, message {}", status.code, message),
            response: Response::json(status, body),
        })
    }
}

/// Handle a single client connection
async fn handle_connection<S>(mut stream: S) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = tokio::time::timeout(REQUEST_TIMEOUT, read_request(&mut stream))
        .await
        .map_err(|_| ConnectionError::Timeout)??;

    let (summary, response) = match exchange {
        Exchange::Respond { summary, response } => (summary, response),
        Exchange::Closed => {
            trace!("Connection closed before request head");
            return Ok(());
        }
    };

    logging::access(&summary);

    tokio::time::timeout(REQUEST_TIMEOUT, write_response(&mut stream, &response))
        .await
        .map_err(|_| ConnectionError::Timeout)??;
    Ok(())
}

async fn write_response<S>(stream: &mut S, response: &Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&response.encode()).await?;
    stream.shutdown().await
}

/// Read one request and build the response for it.
async fn read_request<S>(stream: &mut S) -> Result<Exchange, ConnectionError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    let head = loop {
        match http::parse(&buffer) {
            ParseResult::Complete(head, consumed) => {
                buffer.advance(consumed);
                break head;
            }
            ParseResult::Incomplete => {
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    return Ok(Exchange::Closed);
                }
            }
            ParseResult::Error(e) => {
                warn!(error = %e, "Malformed request");
                return Exchange::reject(e.status(), e.to_string());
            }
        }
    };

    trace!(
        method = ?head.method,
        target = %head.target,
        version = %head.version,
        "Processing request"
    );

    match head.method {
        Method::Get => {
            let body = payload::handle_get(&head.target, &head.headers).to_json()?;
            Ok(respond(&head, body))
        }
        Method::Post => {
            let content_length = head.content_length();
            if content_length > MAX_BODY_SIZE {
                return Exchange::reject(
                    Status::PAYLOAD_TOO_LARGE,
                    format!("Content-Length {content_length} exceeds limit of {MAX_BODY_SIZE} bytes"),
                );
            }

            let body = read_body(stream, buffer, content_length).await?;
            let body = payload::handle_post(&head.target, &body, content_length).to_json()?;
            Ok(respond(&head, body))
        }
        Method::Other(ref name) => Exchange::reject(
            Status::NOT_IMPLEMENTED,
            format!("Unsupported method ('{name}')"),
        ),
    }
}

fn respond(head: &RequestHead, body: String) -> Exchange {
    Exchange::Respond {
        summary: head.request_line.clone(),
        response: Response::json(Status::OK, body),
    }
}

/// Read up to `content_length` body bytes, starting with whatever followed
/// the head in `buffer`. Stops early at EOF.
async fn read_body<S>(
    stream: &mut S,
    mut buffer: BytesMut,
    content_length: usize,
) -> io::Result<BytesMut>
where
    S: AsyncRead + Unpin,
{
    while buffer.len() < content_length {
        buffer.reserve((content_length - buffer.len()).min(BUFFER_SIZE));
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            debug!(
                expected = content_length,
                received = buffer.len(),
                "Body ended before Content-Length"
            );
            break;
        }
    }
    buffer.truncate(content_length);
    Ok(buffer)
}

/// Server-level errors
#[derive(Debug)]
pub enum ServerError {
    Bind(SocketAddr, io::Error),
    Io(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Per-connection errors. These end the connection, never the server.
#[derive(Debug)]
pub enum ConnectionError {
    Io(io::Error),
    Encode(serde_json::Error),
    Timeout,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
            ConnectionError::Encode(e) => write!(f, "Failed to encode response: {}", e),
            ConnectionError::Timeout => {
                write!(f, "Connection stalled for {:?}", REQUEST_TIMEOUT)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<serde_json::Error> for ConnectionError {
    fn from(e: serde_json::Error) -> Self {
        ConnectionError::Encode(e)
    }
}
