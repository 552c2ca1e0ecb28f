//! Shared fixtures: a recording backend and a running bridge in front of it.

#![allow(dead_code)]

use api_bridge::common::TlsConfig;
use api_bridge::config::Config;
use api_bridge::proxy::ProxyServer;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CONTENT_TYPE, SET_COOKIE};
use hyper::server::conn::http1::Builder as ServerBuilder;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Version};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

type BackendBody = UnsyncBoxBody<Bytes, Infallible>;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub version: Version,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Default)]
pub struct Seen(Arc<Mutex<Vec<SeenRequest>>>);

impl Seen {
    pub fn all(&self) -> Vec<SeenRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> SeenRequest {
        self.all().pop().expect("backend saw no request")
    }

    fn push(&self, req: SeenRequest) {
        self.0.lock().unwrap().push(req);
    }
}

fn full(body: &'static str) -> BackendBody {
    Full::new(Bytes::from(body)).boxed_unsync()
}

/// Backend behavior by path suffix:
/// - `/cookies`: 200 with two Set-Cookie headers
/// - `/missing`: 404 with a body
/// - `/slow`: answers after three seconds
/// - `/stall`: sends headers and one chunk, then never finishes
/// - `/echo`: returns the request body
/// - anything else: 200 "ok"
async fn backend_handler(req: Request<Incoming>, seen: Seen) -> Result<Response<BackendBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    seen.push(SeenRequest {
        method: parts.method.clone(),
        version: parts.version,
        uri: parts.uri.to_string(),
        headers: parts.headers.clone(),
        body: body.clone(),
    });

    let path = parts.uri.path();
    let response = if path.ends_with("/cookies") {
        Response::builder()
            .status(StatusCode::OK)
            .header(SET_COOKIE, "session=abc123; Path=/; HttpOnly")
            .header(SET_COOKIE, "theme=dark; Max-Age=3600")
            .header(CONTENT_TYPE, "application/json")
            .body(full("{\"ok\":true}"))
    } else if path.ends_with("/missing") {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(CONTENT_TYPE, "text/plain")
            .body(full("backend says no"))
    } else if path.ends_with("/slow") {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Response::builder().status(StatusCode::OK).body(full("late"))
    } else if path.ends_with("/stall") {
        let first = futures::stream::once(async { Ok::<_, Infallible>(Frame::data(Bytes::from("partial"))) });
        let stream = first.chain(futures::stream::pending());
        Response::builder()
            .status(StatusCode::OK)
            .body(StreamBody::new(stream).boxed_unsync())
    } else if path.ends_with("/echo") {
        Response::builder()
            .status(StatusCode::CREATED)
            .body(Full::new(body).boxed_unsync())
    } else {
        Response::builder().status(StatusCode::OK).body(full("ok"))
    };

    Ok(response.expect("valid backend response"))
}

pub async fn spawn_backend() -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Seen::default();
    let recorder = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let recorder = recorder.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| backend_handler(req, recorder.clone()));
                let _ = ServerBuilder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, seen)
}

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Same behavior as [`spawn_backend`], behind TLS with a self-signed certificate.
/// ALPN offers h2 and http/1.1; the connection serves whichever is negotiated.
pub async fn spawn_tls_backend() -> (SocketAddr, Seen) {
    let tls_config = TlsConfig::create_config(&fixture("backend-key.pem"), &fixture("backend-cert.pem")).unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Seen::default();
    let recorder = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let acceptor = acceptor.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move {
                // Handshake failures are expected when the caller verifies certificates
                let Ok(tls_stream) = acceptor.accept(stream).await else { return };
                let service = service_fn(move |req| backend_handler(req, recorder.clone()));
                let _ = AutoBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(tls_stream), service)
                    .await;
            });
        }
    });

    (addr, seen)
}

/// Address nobody is listening on
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn bridge_config(backend_url: String) -> Config {
    Config {
        frontend_prefix: "/api/".to_string(),
        backend_url,
        listen_addr: "127.0.0.1:0".to_string(),
        ..Config::default()
    }
}

pub struct Bridge {
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl Bridge {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

pub async fn spawn_bridge(config: Config) -> Bridge {
    let resolved = config.resolve().unwrap();
    let server = ProxyServer::new(resolved).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(server.serve(listener, rx));
    Bridge { addr, shutdown }
}

pub fn client() -> Client<HttpConnector, Full<Bytes>> {
    Client::builder(TokioExecutor::new()).build_http()
}

pub async fn body_bytes(response: Response<Incoming>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}
