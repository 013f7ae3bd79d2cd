//! Assorted request inspection helpers shared by filters and the log
//! formatter.

use http::header::HeaderName;

use crate::request::Request;

/// Returns the media subtype extension in an URL path, with the leading dot.
///
/// `/api/v1/tickets.xml` yields `.xml`. Only the final path segment is
/// considered, so `/api/v1.2/tickets` yields `None`.
pub fn path_ext(path: &str) -> Option<&str> {
    let seg_start = path.rfind('/').map_or(0, |i| i + 1);
    path[seg_start..]
        .rfind('.')
        .map(|dot| &path[seg_start + dot..])
}

/// Split a `host:port` address into its parts. The port is empty when the
/// address carries none.
pub fn split_port(addr: &str) -> (&str, &str) {
    match addr.rfind(':') {
        Some(i) => (&addr[..i], &addr[i + 1..]),
        None => (addr, ""),
    }
}

/// Whether the request arrived over a secure channel. Checks the TLS marker
/// set by the host, then the `X-Forwarded-Proto` header for proxied requests.
pub fn is_request_tls(req: &Request) -> bool {
    req.tls
        || req
            .header(&HeaderName::from_static("x-forwarded-proto"))
            .is_some_and(|v| v == "https")
}

/// Best-guess client address for proxied requests, derived from the
/// `Forwarded`, `X-Forwarded-For` and `X-Real-IP` headers, in that order.
/// The header-derived address is authoritative when present.
///
/// Returns `"unknown"` when no proxy header identifies the client.
pub fn real_ip(req: &Request) -> String {
    if let Some(v) = req.header(&HeaderName::from_static("forwarded")) {
        let first = v.split(',').next().unwrap_or("");
        if let Some(value) = first.trim().strip_prefix("for=") {
            let value = value.trim_matches(|c| c == '"' || c == '[' || c == ']');
            if !value.is_empty() && !value.starts_with('_') {
                return value.to_string();
            }
        }
    }

    if let Some(v) = req.header(&HeaderName::from_static("x-forwarded-for")) {
        let first = v.split(',').next().unwrap_or("").trim();
        if !first.is_empty() && first != "unknown" {
            return first.to_string();
        }
    }

    if let Some(v) = req.header(&HeaderName::from_static("x-real-ip")) {
        return v.to_string();
    }

    "unknown".to_string()
}
