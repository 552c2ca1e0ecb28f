use crate::error::{ProxyError, TransportErrorKind};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::UnsyncBoxBody};
use hyper::body::{Body, Frame, SizeHint};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use rustls::ServerConfig;
use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Instant, Sleep, sleep_until};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type handed back to callers: either a relayed backend stream or a
/// locally generated error page.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Wrap a streamed body so any body error is boxed.
pub fn relay<B>(body: B) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Locally generated responses
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Plain-text response whose body is the status's reason phrase.
    pub fn error(status: StatusCode) -> Response<ProxyBody> {
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut response = Response::new(full(format!("{}\n", reason)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }

    pub fn not_found() -> Response<ProxyBody> {
        Self::error(StatusCode::NOT_FOUND)
    }
}

/// Streams `inner` until `deadline`, then ends the stream with a timeout error.
pub struct DeadlineBody<B> {
    inner: B,
    deadline: Pin<Box<Sleep>>,
    expired: bool,
}

impl<B> DeadlineBody<B> {
    pub fn new(inner: B, deadline: Instant) -> Self {
        Self {
            inner,
            deadline: Box::pin(sleep_until(deadline)),
            expired: false,
        }
    }
}

impl<B> Body for DeadlineBody<B>
where
    B: Body + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }

        if let Poll::Ready(frame) = Pin::new(&mut this.inner).poll_frame(cx) {
            return Poll::Ready(frame.map(|r| r.map_err(Into::into)));
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            this.expired = true;
            let err = ProxyError::transport(
                TransportErrorKind::RequestTimeout,
                "request deadline exceeded while streaming body",
            );
            return Poll::Ready(Some(Err(Box::new(err) as BoxError)));
        }

        Poll::Pending
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// TLS setup for the HTTPS listener
pub struct TlsConfig;

impl TlsConfig {
    /// Creates a TLS configuration from certificate and key files
    pub fn create_config(private_key_path: &str, cert_path: &str) -> Result<ServerConfig, ProxyError> {
        let mut private_key_file = BufReader::new(
            File::open(private_key_path)
                .map_err(|e| ProxyError::Config(format!("Failed to open private key file: {}", e)))?
        );

        let mut cert_file = BufReader::new(
            File::open(cert_path)
                .map_err(|e| ProxyError::Config(format!("Failed to open certificate file: {}", e)))?
        );

        let certs = rustls_pemfile::certs(&mut cert_file)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProxyError::Config(format!("Failed to read certificate: {}", e)))?;

        if certs.is_empty() {
            return Err(ProxyError::Config("No valid certificate found".to_string()));
        }

        let private_key = rustls_pemfile::private_key(&mut private_key_file)
            .map_err(|e| ProxyError::Config(format!("Failed to read private key: {}", e)))?
            .ok_or_else(|| ProxyError::Config("No valid private key found".to_string()))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, private_key)
            .map_err(|e| ProxyError::Config(format!("Failed to create TLS config: {}", e)))?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(config)
    }
}
