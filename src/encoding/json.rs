use std::io;
use std::io::Read;

use serde_json::Value;

use super::Encoder;
use crate::error::{DecodeError, EncodeError};

/// Default JSON body size limit, 2 MiB.
const DEFAULT_MAX_BODY_SIZE: u64 = 2 * 1024 * 1024;

/// JSON implementation of [`Encoder`], the service default representation.
pub struct JsonEncoder {
    /// Maximum size in bytes of JSON content accepted by [`Encoder::decode`].
    pub max_body_size: u64,
    /// Whether to output indented JSON.
    pub indented: bool,
    /// Media type advertised in the `Accept` header.
    pub accept_header: String,
    /// Media type sent in the `Content-Type` header.
    pub content_type_header: String,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            indented: false,
            accept_header: "application/json".to_string(),
            content_type_header: "application/json;charset=utf-8".to_string(),
        }
    }
}

impl Encoder for JsonEncoder {
    fn accept(&self) -> &str {
        &self.accept_header
    }

    fn content_type(&self) -> &str {
        &self.content_type_header
    }

    fn encode(&self, w: &mut dyn io::Write, v: &Value) -> Result<(), EncodeError> {
        if self.indented {
            serde_json::to_writer_pretty(w, v)?;
        } else {
            serde_json::to_writer(w, v)?;
        }
        Ok(())
    }

    fn decode(&self, r: &mut dyn io::Read) -> Result<Value, DecodeError> {
        let mut buf = Vec::new();
        r.take(self.max_body_size + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > self.max_body_size {
            return Err(DecodeError::BodyTooLarge);
        }
        Ok(serde_json::from_slice(&buf)?)
    }
}
