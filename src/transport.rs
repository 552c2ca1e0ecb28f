//! Outbound connections to the backend.
//!
//! One pooled client is built at startup and shared by every request. The policy:
//! - TLS verification can be switched off for non-production backends
//! - response headers must arrive within the configured window
//! - idle pooled connections are closed after the pool idle timeout
//! - dial timeout and TCP keep-alive apply to every new connection
//! - h2 is offered through ALPN and used when the backend picks it

use crate::classify::{classify, describe};
use crate::config::TransportConfig;
use crate::error::{ProxyError, TransportErrorKind};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use log::{debug, info};
use tokio::time::timeout;

pub type BackendClient<B> = Client<HttpsConnector<HttpConnector>, B>;

pub struct Transport<B = Incoming>
where
    B: hyper::body::Body + Send + 'static + Unpin,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    client: BackendClient<B>,
    config: TransportConfig,
}

impl<B> Transport<B>
where
    B: hyper::body::Body + Send + 'static + Unpin,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    pub fn new(config: TransportConfig) -> Result<Self, ProxyError> {
        let connector = build_connector(&config)?;

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        info!(
            "Backend transport ready: tls_skip_verify={}, http2={}, header_timeout={}s, dial_timeout={}s, pool idle {}s ({} per host, {} total)",
            config.tls_skip_verify,
            config.http2,
            config.response_header_timeout_secs,
            config.connect_timeout_secs,
            config.pool_idle_timeout_secs,
            config.pool_max_idle_per_host,
            config.pool_max_idle,
        );

        Ok(Self { client, config })
    }

    /// Send `req` and wait for the response head.
    ///
    /// The body is not awaited here; the caller streams it.
    pub async fn send(&self, req: Request<B>) -> Result<Response<Incoming>, ProxyError> {
        let window = self.config.response_header_timeout();
        match timeout(window, self.client.request(req)).await {
            Err(_) => Err(ProxyError::transport(
                TransportErrorKind::ResponseHeaderTimeout,
                format!("timeout awaiting response headers after {}s", window.as_secs()),
            )),
            Ok(Err(e)) => {
                let kind = classify(&e, e.is_connect());
                let message = describe(&e);
                debug!("Backend call failed ({}): {}", kind, message);
                Err(ProxyError::transport(kind, message))
            }
            Ok(Ok(response)) => Ok(response),
        }
    }
}

fn build_connector(config: &TransportConfig) -> Result<HttpsConnector<HttpConnector>, ProxyError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout()));
    http.set_keepalive(Some(config.tcp_keepalive()));
    http.set_nodelay(true);

    let mut tls = native_tls::TlsConnector::builder();
    if config.tls_skip_verify {
        tls.danger_accept_invalid_certs(true);
        tls.danger_accept_invalid_hostnames(true);
    }
    if config.http2 {
        tls.request_alpns(&["h2", "http/1.1"]);
    } else {
        tls.request_alpns(&["http/1.1"]);
    }
    let tls = tls
        .build()
        .map_err(|e| ProxyError::Config(format!("Failed to build TLS connector: {}", e)))?;

    Ok(HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Empty;
    use hyper::StatusCode;
    use hyper::body::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn test_transport_builds_with_defaults() {
        let transport = Transport::<Empty<Bytes>>::new(TransportConfig::default());
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_is_service_unavailable() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = Transport::<Empty<Bytes>>::new(TransportConfig::default()).unwrap();
        let req = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Empty::new())
            .unwrap();

        let err = transport.send(req).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_silent_backend_hits_header_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            // Accept and never answer
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut config = TransportConfig::default();
        config.response_header_timeout_secs = 1;
        let transport = Transport::<Empty<Bytes>>::new(config).unwrap();
        let req = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Empty::new())
            .unwrap();

        match transport.send(req).await {
            Err(ProxyError::Transport { kind, .. }) => {
                assert_eq!(kind, TransportErrorKind::ResponseHeaderTimeout);
                assert_eq!(kind.status(), StatusCode::GATEWAY_TIMEOUT);
            }
            other => panic!("expected header timeout, got {:?}", other.map(|r| r.status())),
        }
        holder.abort();
    }
}
