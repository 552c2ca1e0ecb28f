//! Accepts caller connections and hands each request to the forwarding pipeline.

use crate::common::{ProxyBody, TlsConfig};
use crate::config::ResolvedConfig;
use crate::error::ProxyError;
use crate::headers::request_cookies;
use crate::reverse_proxy::ReverseProxy;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ServerBuilder;
use log::{debug, error, info, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

pub struct ProxyServer {
    proxy: Arc<ReverseProxy>,
    tls_acceptor: Option<TlsAcceptor>,
}

impl ProxyServer {
    pub fn new(config: ResolvedConfig) -> Result<Self, ProxyError> {
        let tls_acceptor = match config.tls_paths() {
            Some((private_key, certificate)) => {
                debug!("Loading TLS certificate from: {}", certificate);
                debug!("Loading TLS private key from: {}", private_key);
                let tls_config = TlsConfig::create_config(private_key, certificate)?;
                Some(TlsAcceptor::from(Arc::new(tls_config)))
            }
            None => None,
        };

        let proxy = ReverseProxy::new(Arc::new(config))?;

        Ok(Self {
            proxy: Arc::new(proxy),
            tls_acceptor,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        self.proxy.config()
    }

    /// Bind the configured listen address and serve until `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ProxyError> {
        let addr = self.config().listen_addr;
        info!("Binding listener to: {}", addr);
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> Result<(), ProxyError> {
        let local_addr = listener.local_addr()?;
        let scheme = if self.tls_acceptor.is_some() { "https" } else { "http" };
        info!("API bridge listening on {}://{}", scheme, local_addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let proxy = self.proxy.clone();
                    match self.tls_acceptor.clone() {
                        Some(acceptor) => {
                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => serve_connection(tls_stream, proxy, remote_addr).await,
                                    Err(e) => warn!("Error establishing TLS connection from {}: {}", remote_addr, e),
                                }
                            });
                        }
                        None => {
                            tokio::spawn(serve_connection(stream, proxy, remote_addr));
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Listener on {} stopped accepting connections", local_addr);
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn serve_connection<I>(io: I, proxy: Arc<ReverseProxy>, remote_addr: SocketAddr)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let proxy = proxy.clone();
        async move { Ok::<_, Infallible>(dispatch(&proxy, req, remote_addr).await) }
    });

    // Dropping the connection drops any in-flight forward, which aborts the backend call
    if let Err(e) = ServerBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        error!("Error serving connection from {}: {}", remote_addr, e);
    }
}

/// Log the inbound request, then forward it.
pub async fn dispatch(proxy: &ReverseProxy, req: Request<Incoming>, remote_addr: SocketAddr) -> Response<ProxyBody> {
    log_request(&req, remote_addr);
    proxy.handle_request(req, remote_addr).await
}

fn log_request<B>(req: &Request<B>, remote_addr: SocketAddr) {
    info!("Received request: {} {} from {}", req.method(), req.uri().path(), remote_addr);

    info!("Request Headers:");
    for (name, value) in req.headers() {
        info!("  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }

    let cookies = request_cookies(req.headers());
    if !cookies.is_empty() {
        info!("Request Cookies:");
        for (name, value) in cookies {
            info!("  {}: {}", name, value);
        }
    }
}
