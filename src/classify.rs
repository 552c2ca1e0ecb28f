//! Maps backend communication failures to the status returned to the caller.
//!
//! Typed inspection of the error chain comes first (io error kinds, TLS errors).
//! When nothing typed matches, the failure description decides:
//! "timeout" or "timed out" means 504, "connection refused" means 503, anything else 502.

use crate::error::TransportErrorKind;
use hyper::StatusCode;
use std::error::Error as StdError;
use std::io;

/// Classify a failure raised while sending a request to the backend.
///
/// `connecting` tells whether the failure happened while establishing the connection.
pub fn classify(err: &(dyn StdError + 'static), connecting: bool) -> TransportErrorKind {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<native_tls::Error>().is_some() {
            return TransportErrorKind::TlsFailure;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut if connecting => return TransportErrorKind::DialTimeout,
                io::ErrorKind::TimedOut => return TransportErrorKind::ResponseHeaderTimeout,
                io::ErrorKind::ConnectionRefused => return TransportErrorKind::DialRefused,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => return TransportErrorKind::ConnectionReset,
                _ => {}
            }
        }
        current = e.source();
    }

    kind_from_description(&describe(err), connecting)
}

/// Category derived from a failure description alone.
pub fn kind_from_description(description: &str, connecting: bool) -> TransportErrorKind {
    let description = description.to_lowercase();
    if mentions_timeout(&description) {
        if connecting {
            TransportErrorKind::DialTimeout
        } else {
            TransportErrorKind::ResponseHeaderTimeout
        }
    } else if description.contains("connection refused") {
        TransportErrorKind::DialRefused
    } else if description.contains("certificate") || description.contains("handshake") {
        TransportErrorKind::TlsFailure
    } else if description.contains("connection reset") {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    }
}

/// Caller-visible status for a failure description.
pub fn status_for_description(description: &str) -> StatusCode {
    let description = description.to_lowercase();
    if mentions_timeout(&description) {
        StatusCode::GATEWAY_TIMEOUT
    } else if description.contains("connection refused") {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_GATEWAY
    }
}

// Expects an already lowercased description
fn mentions_timeout(description: &str) -> bool {
    description.contains("timeout") || description.contains("timed out")
}

/// Full description of an error including every source, joined with ": ".
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut description = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        current = e.source();
    }
    description
}
