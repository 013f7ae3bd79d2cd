//! Test-only helpers shared across unit tests.

use std::io;

use http::header::HeaderMap;
use http::{Method, StatusCode};

use crate::request::Request;
use crate::response::ResponseWriter;

/// Response writer that collects everything in memory for assertions.
#[derive(Default)]
pub(crate) struct MockWriter {
    pub headers: HeaderMap,
    pub status: Option<StatusCode>,
    pub body: Vec<u8>,
}

impl MockWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseWriter for MockWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, code: StatusCode) {
        if self.status.is_none() {
            self.status = Some(code);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    fn wrote_header(&self) -> bool {
        self.status.is_some()
    }
}

/// A GET request with sensible host/remote defaults for filter tests.
pub(crate) fn request(method: Method, path: &str) -> Request {
    let mut req = Request::new(method, path);
    req.remote_addr = "192.0.2.1:52611".to_string();
    req.host = "api.example.com".to_string();
    req
}
