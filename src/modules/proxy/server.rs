//! Inbound HTTP/1.1 listener.

use super::error::{ProxyError, ProxyResult};
use super::handler::ProxyHandler;
use super::scheme::ConnectionInfo;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// Accept loop feeding every request to a shared [`ProxyHandler`].
///
/// One task per connection; requests on a keep-alive connection are
/// handled in order.
pub struct ProxyServer {
    handler: Arc<ProxyHandler>,
    tls: Option<TlsAcceptor>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("tls", &self.tls.is_some())
            .field("local_addr", &self.local_addr)
            .field("running", &self.shutdown_tx.is_some())
            .finish()
    }
}

impl ProxyServer {
    /// Create a server.
    #[must_use]
    pub fn new(handler: Arc<ProxyHandler>) -> Self {
        Self {
            handler,
            tls: None,
            local_addr: None,
            shutdown_tx: None,
        }
    }

    /// Terminate TLS on accepted connections.
    #[must_use]
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Bind a listening socket without needing an async context.
    pub fn bind(addr: &str) -> ProxyResult<std::net::TcpListener> {
        let bind_error = |e: std::io::Error| ProxyError::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        };

        let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        Ok(listener)
    }

    /// Spawn the accept loop on the current tokio runtime.
    pub fn serve(&mut self, listener: std::net::TcpListener) -> ProxyResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(ProxyError::AlreadyRunning);
        }

        let local_addr = listener.local_addr().map_err(|e| ProxyError::Bind {
            addr: "listener".to_string(),
            message: e.to_string(),
        })?;
        let listener = TcpListener::from_std(listener).map_err(|e| ProxyError::Bind {
            addr: local_addr.to_string(),
            message: e.to_string(),
        })?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let handler = Arc::clone(&self.handler);
        let tls = self.tls.clone();

        info!(%local_addr, tls = tls.is_some(), "Proxy listening");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                debug!(%peer, "New connection");

                                let handler = Arc::clone(&handler);
                                let tls = tls.clone();

                                tokio::spawn(async move {
                                    match tls {
                                        Some(acceptor) => match acceptor.accept(stream).await {
                                            Ok(stream) => {
                                                serve_connection(stream, handler, ConnectionInfo::tls(peer)).await;
                                            }
                                            Err(e) => {
                                                debug!(%peer, "TLS handshake failed: {e}");
                                            }
                                        },
                                        None => {
                                            serve_connection(stream, handler, ConnectionInfo::plain(peer)).await;
                                        }
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(%local_addr, "Proxy shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Stop accepting connections. In-flight connections run to completion.
    pub fn stop(&mut self) -> ProxyResult<()> {
        let tx = self.shutdown_tx.take().ok_or(ProxyError::NotRunning)?;
        // A full channel means shutdown is already pending.
        let _ = tx.try_send(());
        self.local_addr = None;
        Ok(())
    }

    /// Check if the accept loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn serve_connection<S>(stream: S, handler: Arc<ProxyHandler>, connection: ConnectionInfo)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let stats = Arc::clone(handler.stats());
    stats.connection_opened();

    let peer = connection.peer;
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = Arc::clone(&handler);
        let connection = connection.clone();

        async move { Ok::<_, Infallible>(handler.serve(req, &connection).await) }
    });

    if let Err(e) = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(peer = ?peer, "Connection error: {e}");
    }

    stats.connection_closed();
}
