//! Tokio TCP server.
//!
//! Accepts TCP connections, parses HTTP/1.1 requests and hands each one to a
//! synchronous handler on Tokio's blocking pool. The handler runs the whole
//! request (database included) on that worker; the connection task only
//! reads and writes bytes. Persistent connections (keep-alive) are supported.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Largest request (headers plus body) buffered before answering 413.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// The application's HTTP listener.
///
/// # Examples
///
/// ```rust,no_run
/// use captacion::server::Server;
/// use captacion::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8000").await?;
///     server.run(|_req: Request| Response::html(StatusCode::Ok, "hola")).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests with `handler` until the process is terminated.
    pub async fn run<H>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> Response + Send + Sync + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Serves requests with `handler` until `shutdown` resolves.
    ///
    /// Connections already accepted keep running to completion on their own
    /// tasks; only the accept loop stops.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and the loop continues.
    pub async fn run_until<H, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> Response + Send + Sync + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "captacion listening");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

// Runs the handler on the blocking pool. A panicking handler becomes a 500.
async fn dispatch<H>(handler: &Arc<H>, request: Request) -> Response
where
    H: Fn(Request) -> Response + Send + Sync + 'static,
{
    let handler = Arc::clone(handler);
    match tokio::task::spawn_blocking(move || handler(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "request worker failed");
            Response::html(StatusCode::InternalServerError, "<h1>500 Internal Server Error</h1>")
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: one request is read per
/// iteration until the peer closes the connection or sends
/// `Connection: close`.
async fn handle_connection<H>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> Response + Send + Sync + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // The body is parsed with the headers, so wait until all of it is here.
        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if total_needed > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, declared = total_needed, "declared body too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let response = dispatch(&handler, request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}
