use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Instant, SystemTime};

use http::header::HeaderMap;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::encoding::{Encoder, JsonEncoder};
use crate::error::{DecodeError, StatusError};
use crate::ids::RequestId;
use crate::request::Request;
use crate::response::{ResponseBuffer, ResponseWriter};

/// Upper bound on pooled context parts kept around for reuse.
const POOL_LIMIT: usize = 64;

/// Multi-valued mapping of router captures. Values land under their PSE name
/// and under a positional `_N` key, numbered consecutively from `_1`.
#[derive(Debug, Default, Clone)]
pub struct PathValues {
    map: HashMap<String, Vec<String>>,
    positional: usize,
}

impl PathValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// Every value stored under `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.map.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Append a value under an explicit name.
    pub fn add(&mut self, name: &str, value: &str) {
        self.map
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Record one capture: assigns the next positional `_N` key and, when the
    /// subgroup carries a name, the named key as well.
    pub fn record(&mut self, name: Option<&str>, value: &str) {
        self.positional += 1;
        let key = format!("_{}", self.positional);
        debug!(key = %key, value, "path value");
        self.map.insert(key, vec![value.to_string()]);
        if let Some(name) = name {
            debug!(key = name, value, "path value");
            self.add(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.positional = 0;
    }
}

/// Recyclable heap-backed parts of a context. Pooled so that per-request
/// allocation is a map handoff rather than fresh allocations.
struct Parts {
    path_values: PathValues,
    extras: HashMap<String, Value>,
    buffers: Vec<ResponseBuffer>,
}

static PARTS_POOL: Mutex<Vec<Parts>> = Mutex::new(Vec::new());

fn default_encoder() -> Arc<dyn Encoder> {
    static DEFAULT: OnceLock<Arc<JsonEncoder>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(JsonEncoder::new())).clone()
}

/// Per-request carrier wrapping the response writer, the incoming request,
/// router captures, the bound encoder/decoder and a key/value extras map that
/// filters use to communicate.
///
/// `Context` itself implements [`ResponseWriter`]: while a filter holds an
/// active capture, writes divert into the top response buffer; otherwise they
/// reach the underlying writer, defaulting the status to 200 on first body
/// write and counting body bytes.
pub struct Context<'a> {
    writer: &'a mut dyn ResponseWriter,
    pub request: Request,
    pub path_values: PathValues,
    pub request_id: RequestId,

    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Encoder>,
    extras: HashMap<String, Value>,
    buffers: Vec<ResponseBuffer>,

    wrote_header: bool,
    status: StatusCode,
    bytes: u64,
    start: SystemTime,
    started: Instant,
}

impl<'a> Context<'a> {
    /// Allocate a context around a host writer and a parsed request, reusing
    /// pooled parts when available.
    pub fn acquire(writer: &'a mut dyn ResponseWriter, request: Request) -> Self {
        let parts = PARTS_POOL
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Parts {
                path_values: PathValues::new(),
                extras: HashMap::new(),
                buffers: Vec::new(),
            });
        Self {
            writer,
            request,
            path_values: parts.path_values,
            request_id: RequestId::new(),
            encoder: default_encoder(),
            decoder: default_encoder(),
            extras: parts.extras,
            buffers: parts.buffers,
            wrote_header: false,
            status: StatusCode::OK,
            bytes: 0,
            start: SystemTime::now(),
            started: Instant::now(),
        }
    }

    /// Zero the recyclable parts and return them to the pool. Any buffer left
    /// on the capture stack (a filter that panicked between capture and
    /// release) goes back to the buffer pool as well.
    pub fn free(mut self) {
        for rb in self.buffers.drain(..) {
            rb.free();
        }
        let mut parts = Parts {
            path_values: std::mem::take(&mut self.path_values),
            extras: std::mem::take(&mut self.extras),
            buffers: std::mem::take(&mut self.buffers),
        };
        parts.path_values.clear();
        parts.extras.clear();
        let mut pool = PARTS_POOL.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < POOL_LIMIT {
            pool.push(parts);
        }
    }

    /// Divert all subsequent writes into a fresh response buffer seeded with
    /// the current headers. Each `capture` must be paired with a
    /// [`Context::release`].
    pub fn capture(&mut self) {
        let seed = self.headers().clone();
        self.buffers.push(ResponseBuffer::acquire(&seed));
    }

    /// Pop the top capture buffer for inspection. The caller decides whether
    /// to flush, reset or free it.
    pub fn release(&mut self) -> ResponseBuffer {
        self.buffers
            .pop()
            .expect("release called without a matching capture")
    }

    /// Whether writes are currently diverted into a capture buffer.
    pub fn capturing(&self) -> bool {
        !self.buffers.is_empty()
    }

    /// Number of body bytes written to the underlying writer.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Wall-clock time the request entered the service.
    pub fn start_time(&self) -> SystemTime {
        self.start
    }

    /// Time elapsed since the request entered the service.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Store a value in the extras map for downstream filters.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.extras.insert(key.to_string(), value.into());
    }

    /// Retrieve an extras value stored by an upstream filter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Retrieve an extras value as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(|v| v.as_str())
    }

    pub fn encoder(&self) -> Arc<dyn Encoder> {
        self.encoder.clone()
    }

    pub fn set_encoder(&mut self, enc: Arc<dyn Encoder>) {
        self.encoder = enc;
    }

    pub fn decoder(&self) -> Arc<dyn Encoder> {
        self.decoder.clone()
    }

    pub fn set_decoder(&mut self, dec: Arc<dyn Encoder>) {
        self.decoder = dec;
    }

    /// A byte sink writing into the response body.
    pub fn body_writer(&mut self) -> BodyWriter<'_, 'a> {
        BodyWriter(self)
    }

    /// Decode the request body with the negotiated decoder.
    pub fn decode_value(&self) -> Result<Value, DecodeError> {
        let mut reader: &[u8] = &self.request.body;
        self.decoder.decode(&mut reader)
    }

    /// Decode the request body into a concrete type.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let value = self.decode_value()?;
        Ok(serde_json::from_value(value)?)
    }

    /// Write a response encoded with the negotiated encoder, leaving the
    /// status as-is (200 unless a code was written earlier).
    pub fn respond<T: Serialize>(&mut self, v: &T) {
        match serde_json::to_value(v) {
            Ok(value) => self.respond_value(&value, None),
            Err(e) => self.encoding_failed(&e),
        }
    }

    /// Write a response encoded with the negotiated encoder under an explicit
    /// status code.
    pub fn respond_with<T: Serialize>(&mut self, v: &T, code: StatusCode) {
        match serde_json::to_value(v) {
            Ok(value) => self.respond_value(&value, Some(code)),
            Err(e) => self.encoding_failed(&e),
        }
    }

    /// Send an error response: a [`StatusError`] record encoded with the
    /// negotiated encoder under its status code.
    pub fn error(&mut self, code: StatusCode, message: &str) {
        self.error_status(&StatusError::new(code, message));
    }

    /// Like [`Context::error`], with an attached details value.
    pub fn error_with(&mut self, code: StatusCode, message: &str, details: Value) {
        self.error_status(&StatusError::with_details(code, message, details));
    }

    /// Send a prepared [`StatusError`] as the response.
    pub fn error_status(&mut self, err: &StatusError) {
        debug!(code = err.code, message = %err.message, "error response");
        match serde_json::to_value(err) {
            Ok(value) => self.respond_value(&value, Some(err.status())),
            Err(e) => self.encoding_failed(&e),
        }
    }

    fn respond_value(&mut self, value: &Value, code: Option<StatusCode>) {
        let enc = self.encoder.clone();
        let mut buf = Vec::new();
        if let Err(e) = enc.encode(&mut buf, value) {
            self.encoding_failed(&e);
            return;
        }
        if let Some(code) = code {
            self.write_header(code);
        }
        if let Err(e) = self.write(&buf) {
            error!(error = %e, "response write failed");
        }
    }

    /// Encoding failed, most likely a value that isn't representable in the
    /// bound format. Send a generic response because we can't send the real
    /// one.
    fn encoding_failed(&mut self, err: &dyn std::fmt::Display) {
        error!(error = %err, "response encoding failed");
        self.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        let _ = self.write(b"Internal Server Error");
    }
}

impl ResponseWriter for Context<'_> {
    fn headers(&self) -> &HeaderMap {
        match self.buffers.last() {
            Some(rb) => rb.headers(),
            None => self.writer.headers(),
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        match self.buffers.last_mut() {
            Some(rb) => rb.headers_mut(),
            None => self.writer.headers_mut(),
        }
    }

    fn write_header(&mut self, code: StatusCode) {
        if let Some(rb) = self.buffers.last_mut() {
            rb.write_header(code);
            return;
        }
        if self.wrote_header {
            return;
        }
        self.wrote_header = true;
        self.status = code;
        self.writer.write_header(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(rb) = self.buffers.last_mut() {
            return rb.write(buf);
        }
        if !self.wrote_header {
            self.wrote_header = true;
            self.status = StatusCode::OK;
            self.writer.write_header(StatusCode::OK);
        }
        let n = self.writer.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn status(&self) -> StatusCode {
        match self.buffers.last() {
            Some(rb) => rb.status(),
            None if self.wrote_header => self.status,
            None => StatusCode::OK,
        }
    }

    fn wrote_header(&self) -> bool {
        match self.buffers.last() {
            Some(rb) => rb.wrote_header(),
            None => self.wrote_header,
        }
    }
}

/// `io::Write` adapter over a context, so compressors can stream into the
/// response. Obtained with [`Context::body_writer`].
pub struct BodyWriter<'c, 'a>(&'c mut Context<'a>);

impl io::Write for BodyWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
