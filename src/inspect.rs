//! Read-only view of backend response heads, logged before the body is relayed.

use hyper::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, SET_COOKIE,
};
use hyper::{HeaderMap, StatusCode, Version};
use log::info;

/// Response headers recorded for every backend response.
pub const HEADERS_OF_INTEREST: [HeaderName; 4] =
    [CONTENT_TYPE, CONTENT_LENGTH, CACHE_CONTROL, ACCESS_CONTROL_ALLOW_ORIGIN];

/// What gets logged about a backend response. Built from a borrowed head, so the
/// response itself is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status_line: String,
    pub set_cookies: Vec<String>,
    pub headers: Vec<(String, String)>,
}

pub fn summarize(status: StatusCode, version: Version, headers: &HeaderMap) -> ResponseSummary {
    let status_line = format!(
        "{:?} {} {}",
        version,
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .trim_end()
    .to_string();

    let set_cookies = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();

    let mut selected = Vec::new();
    for name in HEADERS_OF_INTEREST.iter() {
        for value in headers.get_all(name).iter() {
            selected.push((
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ));
        }
    }

    ResponseSummary {
        status_line,
        set_cookies,
        headers: selected,
    }
}

/// Log the response head before its body is relayed.
pub fn log_response(status: StatusCode, version: Version, headers: &HeaderMap) -> ResponseSummary {
    let summary = summarize(status, version, headers);

    info!("Response received: {}", summary.status_line);
    if !summary.set_cookies.is_empty() {
        info!("Found {} Set-Cookie headers", summary.set_cookies.len());
        for (i, cookie) in summary.set_cookies.iter().enumerate() {
            info!("Set-Cookie[{}]: {}", i, cookie);
        }
    }
    for (name, value) in &summary.headers {
        info!("Response Header {}: {}", name, value);
    }

    summary
}
