//! Maps frontend request paths onto the backend base path.

use crate::config::ResolvedConfig;
use crate::error::ProxyError;
use hyper::Uri;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Whether the inbound path started with the frontend prefix.
    pub matched: bool,
    /// Inbound path with the prefix removed ("/" when nothing remains).
    pub stripped: String,
    /// Path sent to the backend.
    pub backend_path: String,
}

/// Rewrite `path` relative to `prefix` onto `backend_base`.
///
/// Paths outside the prefix are joined unchanged; rejecting them is the caller's call.
pub fn rewrite_path(path: &str, prefix: &str, backend_base: &str) -> Rewrite {
    let (matched, stripped) = match path.strip_prefix(prefix) {
        Some("") => (true, "/"),
        Some(rest) => (true, rest),
        None => (false, path),
    };

    Rewrite {
        matched,
        stripped: stripped.to_string(),
        backend_path: join_paths(backend_base, stripped),
    }
}

/// Join with exactly one "/" between base and remainder.
fn join_paths(base: &str, remainder: &str) -> String {
    let remainder = remainder.trim_start_matches('/');
    let mut joined = String::with_capacity(base.len() + remainder.len() + 1);
    joined.push_str(base);
    if !joined.ends_with('/') {
        joined.push('/');
    }
    joined.push_str(remainder);
    joined
}

/// Absolute backend URI for a rewritten path, carrying the original query string.
pub fn build_target_uri(config: &ResolvedConfig, backend_path: &str, query: Option<&str>) -> Result<Uri, ProxyError> {
    let path_and_query = match query {
        Some(q) => format!("{}?{}", backend_path, q),
        None => backend_path.to_string(),
    };

    Uri::builder()
        .scheme(config.backend_scheme.clone())
        .authority(config.backend_authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Uri(e.to_string()))
}
