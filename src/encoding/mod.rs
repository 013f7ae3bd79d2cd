//! Media encoders. The content negotiation stage binds one encoder for the
//! response and, on payload methods, one decoder for the request body.
//!
//! New formats are added by implementing [`Encoder`] and registering the
//! object with the service; the built-in representation is JSON.

mod json;

pub use json::JsonEncoder;

use std::io;

use serde_json::Value;

use crate::error::{DecodeError, EncodeError};

/// Objects that implement `Encoder` provide a content encoding format.
///
/// Encoders work over [`serde_json::Value`] as the interchange shape: handlers
/// serialize their response types into a `Value`, and decoded payloads are
/// handed back as a `Value` for the handler to deserialize.
pub trait Encoder: Send + Sync {
    /// The media type used in the HTTP `Accept` header, e.g. `application/json`.
    fn accept(&self) -> &str;

    /// The media type, optionally with character set, used in the
    /// `Content-Type` response header.
    fn content_type(&self) -> &str;

    /// Encode a value into its byte representation, writing it to `w`.
    fn encode(&self, w: &mut dyn io::Write, v: &Value) -> Result<(), EncodeError>;

    /// Decode a payload, usually the request body. Implementations enforce a
    /// maximum body size and fail with [`DecodeError::BodyTooLarge`] beyond it.
    fn decode(&self, r: &mut dyn io::Read) -> Result<Value, DecodeError>;
}
