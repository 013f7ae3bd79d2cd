//! The incoming request as seen by the framework core. The host adapter in
//! [`crate::server`] builds one of these per connection read; tests build them
//! directly.

use http::header::{HeaderMap, HeaderName, CONTENT_LENGTH, REFERER, USER_AGENT};
use http::Method;

use crate::headers;

/// Parsed HTTP request handed to the filter chain.
///
/// `path` is mutable state: the negotiation stage strips a media-type
/// extension from it and the method-override filter rewrites `method`, both
/// before routing happens.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// URL path component, percent-decoded by the host adapter.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Protocol of the request line, e.g. `HTTP/1.1`.
    pub proto: String,
    /// Client address in `host:port` form.
    pub remote_addr: String,
    /// Value of the `Host` header.
    pub host: String,
    /// Whether the connection arrived over TLS.
    pub tls: bool,
}

impl Request {
    /// A minimal request for a method and path, used by tests and by hosts
    /// that fill in the rest afterwards.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            proto: "HTTP/1.1".to_string(),
            remote_addr: String::new(),
            host: String::new(),
            tls: false,
        }
    }

    /// First value of `name`, or `None`.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        headers::get(&self.headers, name)
    }

    /// First value of `name`, or the empty string.
    pub fn header_or_empty(&self, name: &HeaderName) -> &str {
        headers::get_or_empty(&self.headers, name)
    }

    pub fn user_agent(&self) -> &str {
        self.header_or_empty(&USER_AGENT)
    }

    pub fn referer(&self) -> &str {
        self.header_or_empty(&REFERER)
    }

    /// Declared request content length, or 0.
    pub fn content_length(&self) -> u64 {
        self.header(&CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// First query variable with the given name, percent-decoded.
    pub fn query_var(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Path plus query, as it appeared on the request line.
    pub fn request_uri(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}
