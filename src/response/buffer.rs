use std::io;
use std::sync::{Mutex, PoisonError};

use http::header::HeaderMap;
use http::StatusCode;

use super::ResponseWriter;
use crate::headers;

/// Upper bound on pooled buffers kept around for reuse.
const POOL_LIMIT: usize = 64;

/// Buffers ready for reuse. Every acquire is matched by exactly one release
/// on all exit paths.
static POOL: Mutex<Vec<ResponseBuffer>> = Mutex::new(Vec::new());

/// In-memory capture of a response: headers, status and body are recorded
/// instead of emitted, so a filter can inspect, rewrite or suppress the
/// response after the downstream chain ran.
///
/// A buffer owns its own header map, initialized from the target's headers at
/// creation so header lookups made while buffering see what was already set.
/// The recorded status is not emitted until [`ResponseBuffer::flush_header`]
/// or [`ResponseBuffer::flush`] copy it to a target writer.
#[derive(Debug)]
pub struct ResponseBuffer {
    headers: HeaderMap,
    body: Vec<u8>,
    wrote_header: bool,
    status: StatusCode,
}

impl ResponseBuffer {
    /// Take a buffer from the pool, seeding its header map from the target's
    /// current headers.
    pub fn acquire(seed: &HeaderMap) -> Self {
        let mut rb = POOL
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Self {
                headers: HeaderMap::new(),
                body: Vec::new(),
                wrote_header: false,
                status: StatusCode::OK,
            });
        rb.headers.clone_from(seed);
        rb
    }

    /// Zero all fields and return the buffer to the pool.
    pub fn free(mut self) {
        self.headers.clear();
        self.body.clear();
        self.wrote_header = false;
        self.status = StatusCode::OK;
        let mut pool = POOL.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < POOL_LIMIT {
            pool.push(self);
        }
    }

    /// Clear the body but keep headers and status. Used by the not-modified
    /// short-circuit, which still announces the entity tag.
    pub fn reset(&mut self) {
        self.body.clear();
    }

    /// Force the recorded status, bypassing the write-once rule. This is the
    /// explicit override used when a filter replaces the downstream status,
    /// e.g. turning a buffered 200 into a 304.
    pub fn set_status(&mut self, code: StatusCode) {
        self.wrote_header = true;
        self.status = code;
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The buffered body bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Copy headers and, when one was recorded, the status to `target`. The
    /// body stays in the buffer.
    pub fn flush_header(&self, target: &mut dyn ResponseWriter) {
        headers::copy_into(&self.headers, target.headers_mut());
        if self.wrote_header {
            target.write_header(self.status);
        }
    }

    /// Emit the body to an arbitrary byte sink, leaving the buffer intact.
    pub fn write_to(&self, sink: &mut dyn io::Write) -> io::Result<usize> {
        sink.write_all(&self.body)?;
        Ok(self.body.len())
    }

    /// Headers, status, then body to `target`; releases the buffer back to
    /// the pool.
    pub fn flush(self, target: &mut dyn ResponseWriter) -> io::Result<usize> {
        self.flush_header(target);
        let mut written = 0;
        if !self.body.is_empty() {
            written = target.write(&self.body)?;
        }
        self.free();
        Ok(written)
    }
}

impl ResponseWriter for ResponseBuffer {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, code: StatusCode) {
        if self.wrote_header {
            return;
        }
        self.wrote_header = true;
        self.status = code;
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn status(&self) -> StatusCode {
        if self.wrote_header {
            self.status
        } else {
            StatusCode::OK
        }
    }

    fn wrote_header(&self) -> bool {
        self.wrote_header
    }
}
