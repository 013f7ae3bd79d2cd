//! restive is a resource-oriented HTTP service framework: a trie-with-regexp
//! router dispatching typed path segments, content negotiation over a vendor
//! media type, and a FILO filter chain providing response buffering, entity
//! tags and conditional requests, gzip compression, CORS, rate limiting,
//! basic authentication, method override, security headers and access logs.
//!
//! A service maps resources under a base URI; each resource wires its
//! Index/CRUD/Options operations to routes and emits relation links:
//!
//! ```ignore
//! use std::sync::Arc;
//! use restive::prelude::*;
//!
//! let mut svc = Service::new("https://api.example.com/v1")?;
//! svc.use_filter(Arc::new(ETag::default()));
//! svc.resource(Arc::new(Tickets::open())).crud("{uint:id}");
//! HttpServer::new(svc.into_handler()).serve("0.0.0.0:8000")?;
//! ```

pub mod content;
pub mod context;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod headers;
pub mod ids;
pub mod limits;
pub mod links;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;
pub mod server;
pub mod service;
pub mod util;

#[cfg(test)]
mod testing;

pub use content::{parse_media_type, parse_preferences, CONTENT_MEDIA_TYPE};
pub use context::{Context, Handler, PathValues};
pub use encoding::{Encoder, JsonEncoder};
pub use error::{DecodeError, EncodeError, StatusError};
pub use filter::{Filter, FilterScope};
pub use ids::RequestId;
pub use links::Link;
pub use request::Request;
pub use resource::{Crud, Optioner, Resource, Resourcer};
pub use response::{ResponseBuffer, ResponseWriter};
pub use router::Router;
pub use server::HttpServer;
pub use service::{Service, ServiceHandler};

/// Everything needed to assemble a typical service.
pub mod prelude {
    pub use crate::context::{Context, Handler};
    pub use crate::filter::{
        AuthBasic, Cors, ETag, Filter, FilterScope, Gzip, Logs, MethodOverride, Security,
    };
    pub use crate::limits::{MemBucket, Throttle, Usage};
    pub use crate::links::Link;
    pub use crate::resource::{Crud, Optioner, Resourcer};
    pub use crate::response::ResponseWriter;
    pub use crate::server::HttpServer;
    pub use crate::service::Service;
    pub use crate::StatusError;
}
