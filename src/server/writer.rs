use std::io::{self, Write};

use http::header::{HeaderMap, CONTENT_LENGTH, DATE};
use http::StatusCode;

use crate::response::ResponseWriter;

/// Response writer for the host adapter: accumulates headers, status and
/// body in memory and serializes the whole response once the pipeline is
/// done. Keeping emission at the end is what lets filters rewrite headers
/// after the handler ran.
#[derive(Default)]
pub(crate) struct HostResponse {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
}

impl HostResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the response to the wire. For HEAD requests the body is
    /// dropped but `Content-Length` still reflects it.
    pub fn write_to(&self, sink: &mut impl Write, head_only: bool, keep_alive: bool) -> io::Result<()> {
        let status = self.status.unwrap_or(StatusCode::OK);
        write!(
            sink,
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )?;

        for (name, value) in &self.headers {
            if name == &CONTENT_LENGTH || name == &DATE {
                continue;
            }
            sink.write_all(name.as_str().as_bytes())?;
            sink.write_all(b": ")?;
            sink.write_all(value.as_bytes())?;
            sink.write_all(b"\r\n")?;
        }
        write!(sink, "date: {}\r\n", httpdate::fmt_http_date(std::time::SystemTime::now()))?;
        write!(sink, "content-length: {}\r\n", self.body.len())?;
        if !keep_alive {
            sink.write_all(b"connection: close\r\n")?;
        }
        sink.write_all(b"\r\n")?;

        if !head_only {
            sink.write_all(&self.body)?;
        }
        sink.flush()
    }
}

impl ResponseWriter for HostResponse {
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
