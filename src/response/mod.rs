//! The response writer contract and the in-memory response buffer used by
//! body-inspecting filters.

mod buffer;

pub use buffer::ResponseBuffer;

use std::io;

use http::header::HeaderMap;
use http::StatusCode;

/// The contract every response sink implements: a header map, a one-shot
/// status write and a body byte sink.
///
/// The per-request [`Context`](crate::context::Context), the
/// [`ResponseBuffer`] and the host adapter's writer all implement this, which
/// is what lets filters divert and replay responses transparently.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Record the response status. Writes exactly once; subsequent calls are
    /// no-ops.
    fn write_header(&mut self, code: StatusCode);

    /// Write body bytes.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The last known status code, or 200 when none has been written.
    fn status(&self) -> StatusCode;

    /// Whether [`ResponseWriter::write_header`] has been called.
    fn wrote_header(&self) -> bool;
}
