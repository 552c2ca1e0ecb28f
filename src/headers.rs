//! Outbound header rules.

use hyper::HeaderMap;
use hyper::header::{CONNECTION, COOKIE, HOST, HeaderName, HeaderValue};
use http::uri::Authority;

// Forwarding metadata is stripped, never regenerated
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

pub fn forwarding_headers() -> [&'static HeaderName; 4] {
    [&X_FORWARDED_HOST, &X_REAL_IP, &X_FORWARDED_FOR, &X_FORWARDED_PROTO]
}

/// Turn the inbound header set into the outbound one, in place.
///
/// Every header not named here, cookies included, is kept with its values in order.
pub fn sanitize_request_headers(headers: &mut HeaderMap, backend: &Authority) {
    for name in forwarding_headers() {
        headers.remove(name);
    }

    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    // Authority is already valid header text
    if let Ok(host) = HeaderValue::from_str(backend.as_str()) {
        headers.insert(HOST, host);
    }
}

/// Name/value pairs from every `Cookie` header, in order.
pub fn request_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            match pair.split_once('=') {
                Some((name, value)) => Some((name.trim().to_string(), value.trim().to_string())),
                None => Some((pair.to_string(), String::new())),
            }
        })
        .collect()
}
