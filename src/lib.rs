pub mod classify;
pub mod common;
pub mod config;
pub mod error;
pub mod headers;
pub mod inspect;
pub mod logging;
pub mod proxy;
pub mod reverse_proxy;
pub mod rewrite;
pub mod transport;

pub use config::{Config, ResolvedConfig};
pub use error::{ProxyError, TransportErrorKind};
pub use proxy::ProxyServer;
pub use reverse_proxy::ReverseProxy;
