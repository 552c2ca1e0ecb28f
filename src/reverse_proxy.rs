use crate::common::{DeadlineBody, ProxyBody, ResponseBuilder, relay};
use crate::config::ResolvedConfig;
use crate::error::{ProxyError, TransportErrorKind};
use crate::headers::sanitize_request_headers;
use crate::inspect;
use crate::rewrite::{Rewrite, build_target_uri, rewrite_path};
use crate::transport::Transport;
use hyper::body::Incoming;
use hyper::{Request, Response, Uri, Version};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};

/// Forwards requests under the frontend prefix to the backend base URL.
pub struct ReverseProxy {
    config: Arc<ResolvedConfig>,
    transport: Transport<Incoming>,
}

impl ReverseProxy {
    pub fn new(config: Arc<ResolvedConfig>) -> Result<Self, ProxyError> {
        let transport = Transport::new(config.transport.clone())?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Forward one request. Transport failures become 502/503/504 responses;
    /// backend statuses, headers and bodies are relayed untouched.
    pub async fn handle_request(&self, req: Request<Incoming>, remote_addr: SocketAddr) -> Response<ProxyBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.process_request(req).await {
            Ok(response) => response,
            Err(RequestOutcome::Rejected(rewrite)) => {
                warn!(
                    "Rejecting {} {} from {}: path is outside prefix {}",
                    method, rewrite.stripped, remote_addr, self.config.frontend_prefix
                );
                ResponseBuilder::not_found()
            }
            Err(RequestOutcome::Failed(e)) => {
                error!("Proxy error for {} {} from {}: {}", method, path, remote_addr, e);
                let status = e.status();
                info!("Classified proxy error for {} {} as {}", method, path, status);
                ResponseBuilder::error(status)
            }
        }
    }

    async fn process_request(&self, req: Request<Incoming>) -> Result<Response<ProxyBody>, RequestOutcome> {
        let deadline = self.config.transport.request_timeout().map(|d| Instant::now() + d);

        let rewrite = rewrite_path(req.uri().path(), &self.config.frontend_prefix, &self.config.backend_path);
        if !rewrite.matched {
            if self.config.reject_unmatched {
                return Err(RequestOutcome::Rejected(rewrite));
            }
            debug!(
                "Path {} is outside prefix {}, forwarding unchanged",
                rewrite.stripped, self.config.frontend_prefix
            );
        }

        let target_uri = build_target_uri(&self.config, &rewrite.backend_path, req.uri().query())?;
        let before = req.uri().to_string();
        let outbound = self.modify_request(req, target_uri);

        info!("Proxying request: {} {} -> {}", outbound.method(), before, outbound.uri());
        info!("Path mapping: {} -> {}", rewrite.stripped, rewrite.backend_path);

        let response = match deadline {
            Some(deadline) => timeout_at(deadline, self.transport.send(outbound))
                .await
                .map_err(|_| {
                    ProxyError::transport(TransportErrorKind::RequestTimeout, "request deadline exceeded awaiting response headers")
                })??,
            None => self.transport.send(outbound).await?,
        };

        inspect::log_response(response.status(), response.version(), response.headers());

        let (parts, body) = response.into_parts();
        let body = match deadline {
            Some(deadline) => relay(DeadlineBody::new(body, deadline)),
            None => relay(body),
        };

        Ok(Response::from_parts(parts, body))
    }

    /// Point the request at the backend and apply the header rules. The inbound
    /// request is consumed; its body becomes the outbound body as-is.
    fn modify_request(&self, req: Request<Incoming>, target_uri: Uri) -> Request<Incoming> {
        let (mut parts, body) = req.into_parts();
        parts.uri = target_uri;
        // The pooled client picks h2 itself when the backend negotiates it
        parts.version = Version::HTTP_11;
        sanitize_request_headers(&mut parts.headers, &self.config.backend_authority);
        Request::from_parts(parts, body)
    }
}

enum RequestOutcome {
    Rejected(Rewrite),
    Failed(ProxyError),
}

impl From<ProxyError> for RequestOutcome {
    fn from(e: ProxyError) -> Self {
        RequestOutcome::Failed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_reverse_proxy_creation() {
        let config = Config {
            backend_url: "http://backend.example.com/v1".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            ..Config::default()
        }
        .resolve()
        .unwrap();

        let proxy = ReverseProxy::new(Arc::new(config)).unwrap();
        assert_eq!(proxy.config().backend_path, "/v1/");
        assert_eq!(proxy.config().frontend_prefix, "/api/");
    }
}
