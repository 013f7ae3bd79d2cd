use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// An error carrying an HTTP status code. It allows errors to be RESTful and
/// uniform: handlers, the router and the negotiation stage all produce
/// `StatusError` values, and the selected encoder emits them as the error
/// response body.
///
/// A `StatusError` is immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{message}")]
pub struct StatusError {
    /// HTTP status code, or any other numeric ID.
    pub code: u16,
    /// Default error message used in responses and logs.
    pub message: String,
    /// Optional data structure with more information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            details: None,
        }
    }

    /// Same as [`StatusError::new`] with an attached details value.
    pub fn with_details(code: StatusCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            details: Some(details),
        }
    }

    /// The code as a typed [`StatusCode`]. Falls back to 500 when the numeric
    /// code is outside the representable range.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returned when the path searched didn't reach a resource handler.
    pub fn route_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "That route was not found.")
    }

    /// Returned when the path did not match a given HTTP method.
    pub fn route_bad_method() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "That method is not supported")
    }
}

/// Errors produced while decoding a request payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The read length exceeded the maximum size set for decoding payloads.
    #[error("body too large")]
    BodyTooLarge,

    /// The payload was syntactically invalid for the bound decoder.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced while encoding a response body.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The value could not be represented in the encoder's format.
    #[error("unencodable value: {0}")]
    Unencodable(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
