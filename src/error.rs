use hyper::StatusCode;
use thiserror::Error;

/// Category of a failure talking to the backend.
///
/// Backend-reported error statuses are never represented here; they are relayed
/// to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    DialTimeout,
    DialRefused,
    TlsFailure,
    ResponseHeaderTimeout,
    ConnectionReset,
    RequestTimeout,
    Other,
}

impl TransportErrorKind {
    /// Caller-visible status for this category.
    pub fn status(&self) -> StatusCode {
        match self {
            TransportErrorKind::DialTimeout
            | TransportErrorKind::ResponseHeaderTimeout
            | TransportErrorKind::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            TransportErrorKind::DialRefused => StatusCode::SERVICE_UNAVAILABLE,
            TransportErrorKind::TlsFailure
            | TransportErrorKind::ConnectionReset
            | TransportErrorKind::Other => StatusCode::BAD_GATEWAY,
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::DialTimeout => write!(f, "dial-timeout"),
            TransportErrorKind::DialRefused => write!(f, "dial-refused"),
            TransportErrorKind::TlsFailure => write!(f, "tls-failure"),
            TransportErrorKind::ResponseHeaderTimeout => write!(f, "response-header-timeout"),
            TransportErrorKind::ConnectionReset => write!(f, "connection-reset"),
            TransportErrorKind::RequestTimeout => write!(f, "request-timeout"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("URI error: {0}")]
    Uri(String),

    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl ProxyError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        ProxyError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Status returned to the caller when this error ends a forwarding attempt.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Transport { kind, .. } => kind.status(),
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
